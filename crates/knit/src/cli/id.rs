//! `knit id` command implementation.

use anyhow::{Result, anyhow};
use clap::Args;
use colored::Colorize;
use knit::types::Position;
use knit::{CanonicalId, Config, ElementKind, EntityDescriptor, IdRequest, Language, LocalIdService};

/// Describe an entity on the command line.
#[derive(Args, Debug)]
pub struct IdArgs {
    /// Project id (defaults to `project` in the config file)
    #[arg(long)]
    project: Option<String>,

    /// Entity kind (file, function, method, class, databasetable, ...)
    #[arg(short, long)]
    kind: String,

    /// Declaring file
    #[arg(short, long)]
    file: Option<String>,

    /// Simple name
    #[arg(short, long)]
    name: Option<String>,

    /// Parameter count, for functions and methods
    #[arg(short, long)]
    arity: Option<usize>,

    /// Canonical id of the containing element, for members
    #[arg(long)]
    parent: Option<String>,

    /// SQL schema, for tables
    #[arg(long)]
    schema: Option<String>,

    /// HTTP method, for routes
    #[arg(short, long)]
    method: Option<String>,

    /// URL path pattern, for routes
    #[arg(long, visible_alias = "path")]
    pattern: Option<String>,

    /// Start position as LINE:COLUMN, naming anonymous functions and classes
    #[arg(long)]
    at: Option<String>,

    /// Source language, for the GID prefix
    #[arg(short, long)]
    language: Option<String>,
}

impl IdArgs {
    fn descriptor(&self) -> Result<EntityDescriptor> {
        let kind = ElementKind::parse(&self.kind)
            .ok_or_else(|| anyhow!("unknown element kind {:?}", self.kind))?;
        let language = self
            .language
            .as_deref()
            .map(|l| Language::parse(l).ok_or_else(|| anyhow!("unknown language {l:?}")))
            .transpose()?;
        let parent_id = self.parent.as_deref().map(CanonicalId::parse).transpose()?;
        let position = self.at.as_deref().map(parse_position).transpose()?;

        Ok(EntityDescriptor {
            kind: Some(kind),
            file_path: self.file.clone(),
            name: self.name.clone(),
            parent_id,
            parameter_count: self.arity,
            schema_name: self.schema.clone(),
            http_method: self.method.clone(),
            path_pattern: self.pattern.clone(),
            position,
            language,
        })
    }
}

fn parse_position(raw: &str) -> Result<Position> {
    let (line, column) = raw
        .split_once(':')
        .ok_or_else(|| anyhow!("position {raw:?} is not LINE:COLUMN"))?;
    Ok(Position::new(line.trim().parse()?, column.trim().parse()?))
}

/// Run the id command.
pub fn run(config: &Config, args: &IdArgs) -> Result<()> {
    let project = args
        .project
        .as_deref()
        .or(config.project.as_deref())
        .ok_or_else(|| anyhow!("no project id: pass --project or set `project` in the config file"))?;

    let service = LocalIdService::new(config.identity.hasher()?);
    let response = service.identify(&IdRequest::new(project, args.descriptor()?))?;

    println!("{}: {}", "id".white().bold(), response.canonical_id);
    println!("{}: {}", "gid".white().bold(), response.gid);
    Ok(())
}
