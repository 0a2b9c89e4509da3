//! Subcommand definitions and dispatch.

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args as ClapArgs, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use sisync_core::{
    BatchConfig, ConflictAction, DashboardOptions, Dashboards, DataModelOptions, DependencySet,
    EnvironmentConfig, MigrationSummary, Migrator, ProviderConnectionMap, ScriptPayload,
    Selection,
};

use crate::Args;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Migrate groups by name, or every non built-in group
    Groups(NamedSelection),

    /// Migrate users by user name, or every user
    Users(NamedSelection),

    /// Migrate dashboards
    Dashboards {
        #[command(flatten)]
        selection: ArtifactSelection,

        #[command(flatten)]
        conflict: ConflictArgs,

        /// Republish after import
        #[arg(long)]
        republish: bool,

        /// Copy shares, remapping users and groups by name
        #[arg(long)]
        migrate_share: bool,

        /// Give the target dashboard the source owner's counterpart (needs --migrate-share)
        #[arg(long)]
        change_ownership: bool,
    },

    /// Copy shares between already migrated dashboards, pairwise
    DashboardShares {
        #[arg(long, value_delimiter = ',', required = true)]
        source_ids: Vec<String>,

        #[arg(long, value_delimiter = ',', required = true)]
        target_ids: Vec<String>,

        #[arg(long)]
        change_ownership: bool,
    },

    /// Migrate data models
    Datamodels {
        #[command(flatten)]
        selection: ArtifactSelection,

        #[command(flatten)]
        conflict: ConflictArgs,

        /// Dependencies to carry along, or "all"
        #[arg(long, value_delimiter = ',', default_value = "all")]
        dependencies: Vec<String>,

        /// Copy the model's shares
        #[arg(long)]
        shares: bool,

        /// Re-point a provider's connections: PROVIDER=TARGET_CONNECTION_ID
        #[arg(long = "connection", value_parser = parse_connection)]
        connections: Vec<(String, String)>,
    },

    /// Attach a script to a dashboard or one of its widgets in the target
    DashboardScript {
        #[arg(long)]
        dashboard_id: String,

        #[arg(long)]
        widget_id: Option<String>,

        /// File holding a raw script or a {"script": ...} payload
        #[arg(long)]
        script_file: PathBuf,

        /// Temporarily take ownership as this user
        #[arg(long)]
        acting_user: Option<String>,
    },

    /// Replace text inside an existing dashboard or widget script in the target
    ReplaceScript {
        #[arg(long)]
        dashboard_id: String,

        #[arg(long)]
        widget_id: Option<String>,

        #[arg(long)]
        find: String,

        #[arg(long = "with")]
        replacement: String,

        #[arg(long)]
        acting_user: Option<String>,
    },

    /// List the tables and columns a dashboard uses
    DashboardColumns {
        #[arg(long)]
        dashboard_id: String,

        /// Read from the source environment instead of the target
        #[arg(long)]
        in_source: bool,
    },
}

#[derive(ClapArgs, Debug)]
pub struct NamedSelection {
    /// Names to migrate
    names: Vec<String>,

    /// Migrate everything in the source
    #[arg(long, conflicts_with = "names")]
    all: bool,
}

#[derive(ClapArgs, Debug)]
pub struct ArtifactSelection {
    #[arg(long, value_delimiter = ',', conflicts_with_all = ["names", "all"])]
    ids: Vec<String>,

    #[arg(long, value_delimiter = ',', conflicts_with = "all")]
    names: Vec<String>,

    /// Migrate everything in the source, in batches
    #[arg(long)]
    all: bool,
}

impl ArtifactSelection {
    fn selection(&self) -> Result<Option<Selection>> {
        if self.all {
            return Ok(None);
        }
        if !self.ids.is_empty() {
            return Ok(Some(Selection::Ids(self.ids.clone())));
        }
        if !self.names.is_empty() {
            return Ok(Some(Selection::Names(self.names.clone())));
        }
        bail!("pass --ids, --names or --all")
    }
}

#[derive(ClapArgs, Debug)]
pub struct ConflictArgs {
    /// What to do when the artifact exists in the target: skip, overwrite or duplicate
    #[arg(long, default_value = "skip")]
    action: ConflictAction,

    /// Title for duplicates instead of the " (Duplicate)" suffix
    #[arg(long)]
    new_title: Option<String>,
}

fn parse_connection(s: &str) -> std::result::Result<(String, String), String> {
    let (provider, id) = s
        .split_once('=')
        .ok_or_else(|| format!("expected PROVIDER=CONNECTION_ID, got '{}'", s))?;
    if provider.is_empty() || id.is_empty() {
        return Err(format!("expected PROVIDER=CONNECTION_ID, got '{}'", s));
    }
    Ok((provider.to_string(), id.to_string()))
}

fn load_config(path: Option<&Path>, role: &str) -> Result<EnvironmentConfig> {
    let path = path.ok_or_else(|| anyhow!("--{} <FILE> is required", role))?;
    EnvironmentConfig::from_file(path)
        .with_context(|| format!("loading {} environment from {}", role, path.display()))
}

fn migrator(args: &Args) -> Result<Migrator> {
    let batch = BatchConfig::new(args.batch_size, Duration::from_secs(args.sleep_secs))?;
    Ok(Migrator::builder()
        .source_config(load_config(args.source.as_deref(), "source")?)
        .target_config(load_config(args.target.as_deref(), "target")?)
        .batch(batch)
        .build()?)
}

fn report(summary: &MigrationSummary) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(summary)?);
    info!(
        "{} migrated, {} skipped, {} failed",
        summary.migrated(),
        summary.skipped(),
        summary.failed()
    );
    summary.ensure_complete()?;
    Ok(())
}

pub async fn run(args: Args) -> Result<()> {
    match &args.command {
        Command::Groups(sel) => {
            let m = migrator(&args)?;
            let summary = if sel.all {
                m.migrate_all_groups().await?
            } else {
                m.migrate_groups(&sel.names).await
            };
            report(&summary)
        }
        Command::Users(sel) => {
            let m = migrator(&args)?;
            let summary = if sel.all {
                m.migrate_all_users().await?
            } else {
                m.migrate_users(&sel.names).await
            };
            report(&summary)
        }
        Command::Dashboards {
            selection,
            conflict,
            republish,
            migrate_share,
            change_ownership,
        } => {
            let m = migrator(&args)?;
            let options = DashboardOptions {
                action: conflict.action,
                new_title: conflict.new_title.clone(),
                republish: *republish,
                migrate_share: *migrate_share,
                change_ownership: *change_ownership,
            };
            let summary = match selection.selection()? {
                Some(sel) => m.migrate_dashboards(sel, &options).await,
                None => m.migrate_all_dashboards(&options).await?,
            };
            report(&summary)
        }
        Command::DashboardShares {
            source_ids,
            target_ids,
            change_ownership,
        } => {
            let m = migrator(&args)?;
            let summary = m
                .migrate_dashboard_shares(source_ids, target_ids, *change_ownership)
                .await?;
            report(&summary)
        }
        Command::Datamodels {
            selection,
            conflict,
            dependencies,
            shares,
            connections,
        } => {
            let m = migrator(&args)?;
            let provider_connection_map = (!connections.is_empty())
                .then(|| connections.iter().cloned().collect::<ProviderConnectionMap>());
            let options = DataModelOptions {
                action: conflict.action,
                new_title: conflict.new_title.clone(),
                dependencies: DependencySet::parse(dependencies)?,
                shares: *shares,
                provider_connection_map,
            };
            let summary = match selection.selection()? {
                Some(sel) => m.migrate_datamodels(sel, &options).await,
                None => m.migrate_all_datamodels(&options).await?,
            };
            report(&summary)
        }
        Command::DashboardScript {
            dashboard_id,
            widget_id,
            script_file,
            acting_user,
        } => {
            let m = migrator(&args)?;
            let text = std::fs::read_to_string(script_file)
                .with_context(|| format!("reading {}", script_file.display()))?;
            let payload = ScriptPayload::from_input(&text)?;
            let dashboards = Dashboards::new(m.target());
            match widget_id {
                Some(widget_id) => {
                    dashboards
                        .add_widget_script(dashboard_id, widget_id, payload, acting_user.as_deref())
                        .await?
                }
                None => {
                    dashboards
                        .add_dashboard_script(dashboard_id, payload, acting_user.as_deref())
                        .await?
                }
            }
            println!("Script added successfully.");
            Ok(())
        }
        Command::ReplaceScript {
            dashboard_id,
            widget_id,
            find,
            replacement,
            acting_user,
        } => {
            let m = migrator(&args)?;
            let dashboards = Dashboards::new(m.target());
            let replaced = match widget_id {
                Some(widget_id) => {
                    dashboards
                        .replace_widget_script(
                            dashboard_id,
                            widget_id,
                            find,
                            replacement,
                            acting_user.as_deref(),
                        )
                        .await?
                }
                None => {
                    dashboards
                        .replace_dashboard_script(
                            dashboard_id,
                            find,
                            replacement,
                            acting_user.as_deref(),
                        )
                        .await?
                }
            };
            println!("{} occurrence(s) replaced.", replaced);
            Ok(())
        }
        Command::DashboardColumns {
            dashboard_id,
            in_source,
        } => {
            let m = migrator(&args)?;
            let env = if *in_source { m.source() } else { m.target() };
            let columns = Dashboards::new(env).get_dashboard_columns(dashboard_id).await?;
            println!("{}", serde_json::to_string_pretty(&columns)?);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::io::Write;

    #[test]
    fn test_parse_connection() {
        assert_eq!(
            parse_connection("Databricks=conn-123").unwrap(),
            ("Databricks".to_string(), "conn-123".to_string())
        );
        assert!(parse_connection("Databricks").is_err());
        assert!(parse_connection("=x").is_err());
    }

    #[test]
    fn test_datamodels_command_line() {
        let args = Args::try_parse_from([
            "sisync",
            "--source",
            "dev.yaml",
            "--target",
            "prod.yaml",
            "datamodels",
            "--names",
            "Sales Model,Web Model",
            "--action",
            "duplicate",
            "--connection",
            "Databricks=conn-123",
        ])
        .unwrap();

        match args.command {
            Command::Datamodels {
                selection,
                conflict,
                dependencies,
                connections,
                ..
            } => {
                assert_eq!(selection.names, vec!["Sales Model", "Web Model"]);
                assert_eq!(conflict.action, ConflictAction::Duplicate);
                assert_eq!(dependencies, vec!["all"]);
                assert_eq!(connections.len(), 1);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_replace_script_command_line() {
        let args = Args::try_parse_from([
            "sisync",
            "replace-script",
            "--dashboard-id",
            "d1",
            "--find",
            "dev.example.com",
            "--with",
            "bi.example.com",
        ])
        .unwrap();

        match args.command {
            Command::ReplaceScript {
                dashboard_id,
                widget_id,
                find,
                replacement,
                acting_user,
            } => {
                assert_eq!(dashboard_id, "d1");
                assert_eq!(widget_id, None);
                assert_eq!(find, "dev.example.com");
                assert_eq!(replacement, "bi.example.com");
                assert_eq!(acting_user, None);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_selection_requires_a_choice() {
        let sel = ArtifactSelection {
            ids: vec![],
            names: vec![],
            all: false,
        };
        assert!(sel.selection().is_err());
    }

    #[test]
    fn test_missing_target_file_is_reported() {
        let mut source = tempfile::NamedTempFile::new().unwrap();
        writeln!(source, "domain: dev.example.com\ntoken: t").unwrap();
        let args = Args::try_parse_from([
            "sisync",
            "--source",
            source.path().to_str().unwrap(),
            "groups",
            "--all",
        ])
        .unwrap();

        let err = migrator(&args).err().unwrap();
        assert!(err.to_string().contains("--target"));
    }
}
