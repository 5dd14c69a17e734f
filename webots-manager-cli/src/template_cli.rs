//! Template CLI commands
//!
//! Adds, removes, and filters files that are overlaid into installed
//! versions.

use anyhow::{Context, Result};
use clap::Subcommand;
use std::path::PathBuf;
use tabled::{
    settings::{object::Rows, Alignment, Modify, Style},
    Table, Tabled,
};

use webots_manager_core::overlay::TemplateFilters;
use webots_manager_core::{Manager, ManagerConfig, Version};

use crate::print_report;

#[derive(Subcommand, Debug)]
pub enum TemplateCommand {
    /// Store a file and link it into installed versions
    Add {
        /// Local file to store
        file: PathBuf,

        /// Target path relative to a version directory (e.g. worlds/default.wbt)
        path: String,

        /// Only link into this version (repeatable)
        #[clap(long = "only", value_name = "VERSION")]
        only: Vec<Version>,

        /// Never link into this version (repeatable)
        #[clap(long = "except", value_name = "VERSION")]
        except: Vec<Version>,
    },

    /// Remove every template registered at a path
    Remove {
        /// Target path relative to a version directory
        path: String,
    },

    /// Restrict a stored file to a version
    Whitelist {
        /// Local file with the same content as the stored template
        file: PathBuf,

        /// Version identifier
        version: Version,
    },

    /// Exclude a version for a stored file
    Blacklist {
        /// Local file with the same content as the stored template
        file: PathBuf,

        /// Version identifier
        version: Version,
    },

    /// List stored templates
    List {
        /// Output results as JSON
        #[clap(long)]
        json: bool,
    },
}

impl TemplateCommand {
    pub fn execute(self, config: ManagerConfig) -> Result<()> {
        let mut manager = Manager::open(config)?;
        match self {
            TemplateCommand::Add {
                file,
                path,
                only,
                except,
            } => {
                let filters = TemplateFilters {
                    only: only.into_iter().collect(),
                    except: except.into_iter().collect(),
                };
                let report = manager
                    .add_template(&file, &path, &filters)
                    .with_context(|| format!("Failed to add {} as {}", file.display(), path))?;
                println!("✅ Added {} at {}", file.display(), path);
                print_report(&report);
            }
            TemplateCommand::Remove { path } => {
                manager.remove_template(&path)?;
                println!("✅ Removed templates at {path}");
            }
            TemplateCommand::Whitelist { file, version } => {
                let report = manager.whitelist(&file, &version)?;
                println!("✅ {} now restricted to {}", file.display(), version);
                print_report(&report);
            }
            TemplateCommand::Blacklist { file, version } => {
                let report = manager.blacklist(&file, &version)?;
                println!("✅ {} excluded from {}", file.display(), version);
                print_report(&report);
            }
            TemplateCommand::List { json } => list_templates(&manager, json)?,
        }
        Ok(())
    }
}

#[derive(Tabled)]
struct TemplateRow {
    #[tabled(rename = "Digest")]
    digest: String,
    #[tabled(rename = "Paths")]
    paths: String,
    #[tabled(rename = "Only")]
    only: String,
    #[tabled(rename = "Except")]
    except: String,
}

fn join<'a>(items: impl IntoIterator<Item = &'a Version>) -> String {
    items
        .into_iter()
        .map(Version::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

fn list_templates(manager: &Manager, json_output: bool) -> Result<()> {
    let entries = manager.templates().entries();

    if json_output {
        println!("{}", serde_json::to_string_pretty(entries)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!("\nNo templates stored.");
        return Ok(());
    }

    let table_rows: Vec<TemplateRow> = entries
        .iter()
        .map(|(digest, entry)| TemplateRow {
            digest: digest.chars().take(12).collect(),
            paths: entry.paths.join("\n"),
            only: join(&entry.only),
            except: join(&entry.except),
        })
        .collect();

    let table = Table::new(&table_rows)
        .with(Style::rounded())
        .with(Modify::new(Rows::first()).with(Alignment::center()))
        .to_string();

    println!("{table}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser, Debug)]
    struct Harness {
        #[clap(subcommand)]
        command: TemplateCommand,
    }

    #[test]
    fn test_parse_repeated_filters() {
        let parsed = Harness::try_parse_from([
            "template",
            "add",
            "default.wbt",
            "worlds/default.wbt",
            "--only",
            "2023a",
            "--only",
            "2023b",
            "--except",
            "R2022b",
        ])
        .unwrap();

        match parsed.command {
            TemplateCommand::Add { only, except, .. } => {
                assert_eq!(only.len(), 2);
                assert_eq!(except, vec![Version::parse("R2022b").unwrap()]);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_whitelist_requires_version() {
        assert!(Harness::try_parse_from(["template", "whitelist", "default.wbt"]).is_err());
    }
}
