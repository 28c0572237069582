use std::path::PathBuf;

const DEFAULT_CONFIG: &str = "adminorm.toml";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HelpTopic {
    Root,
    Check,
    Describe,
    Sql,
}

#[derive(Debug, Clone)]
pub enum Command {
    Help(HelpTopic),
    Check(CheckArgs),
    Describe(DescribeArgs),
    Sql(SqlArgs),
}

#[derive(Debug, Clone)]
pub struct CheckArgs {
    pub config: PathBuf,
    /// Count rows of every entity against a live database.
    pub live: bool,
    pub database: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DescribeArgs {
    pub config: PathBuf,
    pub entity: String,
}

#[derive(Debug, Clone)]
pub struct SqlArgs {
    pub config: PathBuf,
    pub entity: String,
}

pub fn parse_args(args: &[String]) -> anyhow::Result<Command> {
    let mut it = args.iter().skip(1);
    let Some(first) = it.next() else {
        return Ok(Command::Help(HelpTopic::Root));
    };

    match first.as_str() {
        "-h" | "--help" => Ok(Command::Help(HelpTopic::Root)),
        "check" => parse_check(it.map(|s| s.as_str())),
        "describe" => parse_entity_command(HelpTopic::Describe, it.map(|s| s.as_str())),
        "sql" => parse_entity_command(HelpTopic::Sql, it.map(|s| s.as_str())),
        _ => anyhow::bail!("unknown command: {first}"),
    }
}

fn parse_check<'a>(mut it: impl Iterator<Item = &'a str>) -> anyhow::Result<Command> {
    let mut config = PathBuf::from(DEFAULT_CONFIG);
    let mut live = false;
    let mut database: Option<String> = None;

    while let Some(token) = it.next() {
        match token {
            "-h" | "--help" => return Ok(Command::Help(HelpTopic::Check)),
            "--config" => {
                let Some(v) = it.next() else {
                    anyhow::bail!("--config requires a value");
                };
                config = PathBuf::from(v);
            }
            _ if token.starts_with("--config=") => {
                config = PathBuf::from(token.trim_start_matches("--config="));
            }
            "--database" => {
                let Some(v) = it.next() else {
                    anyhow::bail!("--database requires a value");
                };
                database = Some(v.to_string());
            }
            _ if token.starts_with("--database=") => {
                database = Some(token.trim_start_matches("--database=").to_string());
            }
            "--live" => live = true,
            other => anyhow::bail!("unknown argument: {other}"),
        }
    }

    if database.is_some() && !live {
        anyhow::bail!("--database only applies together with --live");
    }

    Ok(Command::Check(CheckArgs {
        config,
        live,
        database,
    }))
}

fn parse_entity_command<'a>(
    topic: HelpTopic,
    mut it: impl Iterator<Item = &'a str>,
) -> anyhow::Result<Command> {
    let mut config = PathBuf::from(DEFAULT_CONFIG);
    let mut entity: Option<String> = None;

    while let Some(token) = it.next() {
        match token {
            "-h" | "--help" => return Ok(Command::Help(topic)),
            "--config" => {
                let Some(v) = it.next() else {
                    anyhow::bail!("--config requires a value");
                };
                config = PathBuf::from(v);
            }
            _ if token.starts_with("--config=") => {
                config = PathBuf::from(token.trim_start_matches("--config="));
            }
            other if other.starts_with('-') => anyhow::bail!("unknown argument: {other}"),
            other if entity.is_none() => entity = Some(other.to_string()),
            other => anyhow::bail!("unexpected argument: {other}"),
        }
    }

    let Some(entity) = entity else {
        return Ok(Command::Help(topic));
    };
    Ok(match topic {
        HelpTopic::Sql => Command::Sql(SqlArgs { config, entity }),
        _ => Command::Describe(DescribeArgs { config, entity }),
    })
}

pub fn print_help(topic: HelpTopic) {
    match topic {
        HelpTopic::Root => {
            println!(
                "\
adminorm - inspect adminorm mapping catalogs

USAGE:
  adminorm <COMMAND> [OPTIONS]

COMMANDS:
  check         Load and validate a catalog, print a per-entity summary
  describe      Print the field mappings of one entity
  sql           Print the statements the builder composes for an entity

Run `adminorm <command> --help` for more."
            );
        }
        HelpTopic::Check => {
            println!(
                "\
USAGE:
  adminorm check [OPTIONS]

OPTIONS:
  --config <FILE>       Catalog file path (default: adminorm.toml)
  --live                Count the rows of every entity (needs DATABASE_URL)
  --database <URL>      Override DATABASE_URL for --live
  -h, --help            Print help"
            );
        }
        HelpTopic::Describe => {
            println!(
                "\
USAGE:
  adminorm describe <ENTITY> [OPTIONS]

OPTIONS:
  --config <FILE>       Catalog file path (default: adminorm.toml)
  -h, --help            Print help"
            );
        }
        HelpTopic::Sql => {
            println!(
                "\
USAGE:
  adminorm sql <ENTITY> [OPTIONS]

OPTIONS:
  --config <FILE>       Catalog file path (default: adminorm.toml)
  -h, --help            Print help"
            );
        }
    }
}
