//! Crew configuration commands backed by local drafts

use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use cd_api_contract::ConfigTarget;
use cd_client_api::ClientApi;
use cd_core::{AutosaveManager, CoreConfig, DraftStorage, LocalDbStorage};
use cd_rest_client::RestClient;
use clap::{Args, Subcommand};

use crate::server::ServerArgs;

/// Identifies a YAML file or an env file of a crew
#[derive(Args, Debug, Clone)]
pub struct TargetArgs {
    /// Crew identifier
    pub crew: String,

    /// YAML file type (`agents`, `tasks`, ...) or env file name with --env
    pub name: String,

    /// Treat NAME as an environment file
    #[arg(long)]
    pub env: bool,
}

impl TargetArgs {
    pub fn target(&self) -> ConfigTarget {
        if self.env {
            ConfigTarget::env(&self.crew, &self.name)
        } else {
            ConfigTarget::yaml(&self.crew, &self.name)
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Print the current text, preferring a local draft
    Show(TargetArgs),
    /// Store new text as a local draft (reads stdin unless --file is given)
    Draft {
        #[command(flatten)]
        target: TargetArgs,
        /// Read the text from FILE
        #[arg(long, value_name = "FILE")]
        file: Option<PathBuf>,
    },
    /// List saved draft versions, newest first
    Versions(TargetArgs),
    /// Make a stored version the current draft
    Restore {
        #[command(flatten)]
        target: TargetArgs,
        /// Version index as printed by `versions`
        index: usize,
    },
    /// Drop the local draft and its versions
    Clear(TargetArgs),
    /// Write the current text (draft included) to the backend
    Save(TargetArgs),
    /// List the environment files of a crew
    EnvFiles {
        /// Crew identifier
        crew: String,
    },
}

type Editor = AutosaveManager<RestClient>;

async fn open_editor(server: &ServerArgs, target: &TargetArgs) -> Result<Editor> {
    let client = Arc::new(server.client()?);
    let storage: Arc<dyn DraftStorage> = Arc::new(LocalDbStorage::new(server.database()?));
    let mut editor = AutosaveManager::new(client, storage, &CoreConfig::default());
    editor
        .open(target.target())
        .await
        .with_context(|| format!("Failed to open {} for {}", target.name, target.crew))?;
    Ok(editor)
}

impl ConfigCommands {
    pub async fn run(self, server: &ServerArgs) -> Result<()> {
        match self {
            ConfigCommands::Show(target) => {
                let editor = open_editor(server, &target).await?;
                print!("{}", editor.content());
                if !editor.content().ends_with('\n') {
                    println!();
                }
                eprintln!("({})", editor.status());
            }
            ConfigCommands::Draft { target, file } => {
                let text = match file {
                    Some(path) => std::fs::read_to_string(&path)
                        .with_context(|| format!("Failed to read {}", path.display()))?,
                    None => {
                        let mut text = String::new();
                        std::io::stdin().read_to_string(&mut text)?;
                        text
                    }
                };
                let mut editor = open_editor(server, &target).await?;
                if editor.edit(text) {
                    editor.run_pending().await;
                    println!("Draft stored ({} versions)", editor.versions().len());
                } else {
                    println!("No changes");
                }
            }
            ConfigCommands::Versions(target) => {
                let editor = open_editor(server, &target).await?;
                if editor.versions().is_empty() {
                    println!("No versions");
                }
                for (index, version) in editor.versions().iter().enumerate() {
                    println!("{index}  {}  {}", version.timestamp, version.preview);
                }
            }
            ConfigCommands::Restore { target, index } => {
                let mut editor = open_editor(server, &target).await?;
                editor.restore(index)?;
                println!("Restored version {index} as the current draft");
            }
            ConfigCommands::Clear(target) => {
                let mut editor = open_editor(server, &target).await?;
                editor.clear_drafts().await?;
                println!("Cleared drafts for {} of {}", target.name, target.crew);
            }
            ConfigCommands::Save(target) => {
                let mut editor = open_editor(server, &target).await?;
                editor.save().await?;
                println!("Saved {} of {}", target.name, target.crew);
            }
            ConfigCommands::EnvFiles { crew } => {
                let client = server.client()?;
                for file in ClientApi::list_env_files(&client, &crew).await? {
                    println!("{file}");
                }
            }
        }
        Ok(())
    }
}
