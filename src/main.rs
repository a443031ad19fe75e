use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use content_pipeline::{
  ArchiveEngine, DEFAULT_SELECTION_FILE, GroupSelection, PackedBuilder, PipelineConfig,
  VirtualBuilder, write_runtime_pointer,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "content-pipeline", version, about = "Build content bundles and catalogs")]
struct Cli {
  /// Project directory searched for the configuration and selection files.
  #[arg(long, global = true, value_name = "DIR", default_value = ".")]
  project: PathBuf,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Build bundles and write the catalog.
  Build {
    #[arg(long, value_enum, default_value_t = BuildMode::Packed)]
    mode: BuildMode,

    /// Configuration file. Defaults to the one discovered in the project directory.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Group selection file.
    #[arg(long, value_name = "PATH")]
    selection: Option<PathBuf>,

    /// Write the runtime settings path of the build into this file.
    #[arg(long, value_name = "PATH")]
    pointer_file: Option<PathBuf>,
  },
  /// Check the configuration without building.
  Validate {
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
  },
}

#[derive(ValueEnum, Clone, Copy)]
enum BuildMode {
  Packed,
  Virtual,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    )
    .with_writer(std::io::stderr)
    .init();

  let cli = Cli::parse();
  match cli.command {
    Commands::Build {
      mode,
      config,
      selection,
      pointer_file,
    } => {
      let config = load_config(&cli.project, config.as_deref())?;
      let selection_path = selection.unwrap_or_else(|| cli.project.join(DEFAULT_SELECTION_FILE));
      let selection = GroupSelection::load_from_path(&selection_path)?;

      let outcome = match mode {
        BuildMode::Packed => PackedBuilder::new(&config, ArchiveEngine::new()).build(&selection),
        BuildMode::Virtual => VirtualBuilder::new(&config).build(&selection),
      };
      if !outcome.is_success() {
        bail!("build failed: {}", outcome.error);
      }

      if let (Some(pointer_file), Some(runtime_settings)) =
        (pointer_file, outcome.runtime_settings_path.as_deref())
      {
        write_runtime_pointer(&pointer_file, runtime_settings)?;
      }
      if let Some(catalog) = &outcome.catalog_path {
        println!("{}", catalog.display());
      }
    }
    Commands::Validate { config } => {
      let config = load_config(&cli.project, config.as_deref())?;
      config.validate()?;
      info!(groups = config.groups.len(), "configuration is valid");
    }
  }
  Ok(())
}

fn load_config(project: &Path, explicit: Option<&Path>) -> Result<PipelineConfig> {
  match explicit {
    Some(path) => PipelineConfig::from_path(path)
      .with_context(|| format!("failed to load configuration {}", path.display())),
    None => PipelineConfig::discover(project)
      .with_context(|| format!("failed to discover configuration in {}", project.display())),
  }
}
