use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use sitegen_client::{ClientConfig, HttpBackend, ProjectWorkspace, TracingNotifier};
use sitegen_preview::{compose_with, export, ComposeOptions, HostConfig, PreviewHost};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "sitegen")]
#[command(about = "Preview, edit and generate websites")]
struct Args {
    /// YAML config file
    #[arg(short, long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the document a preview frame would mount
    Compose {
        file: PathBuf,
        /// Leave out the editing instrumentation
        #[arg(long)]
        no_edit: bool,
        /// Title for fragments that need a document shell
        #[arg(long)]
        title: Option<String>,
    },
    /// Mount a file in a preview frame and print the extracted markup
    Extract { file: PathBuf },
    /// Wait for a project's generation to finish
    Watch {
        project_id: String,
        /// Directory to write the finished html into
        #[arg(long, value_name = "DIR")]
        out: Option<PathBuf>,
    },
    /// Send a prompt for a project and wait for the result
    Generate { project_id: String, prompt: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    setup_tracing(args.verbose);

    match args.command {
        Command::Compose { file, no_edit, title } => {
            let markup = fs::read_to_string(&file)?;
            let opts = ComposeOptions {
                editing: !no_edit,
                title,
            };
            println!("{}", compose_with(&markup, &opts));
        }
        Command::Extract { file } => {
            let markup = fs::read_to_string(&file)?;
            let mut host = PreviewHost::new(HostConfig::default());
            host.load(&file.display().to_string(), &markup);
            host.wait_mounted().await;
            match host.extract().await {
                Some(html) => println!("{}", html),
                None => return Err("preview frame is not mounted".into()),
            }
        }
        Command::Watch { project_id, out } => {
            let mut workspace = open_workspace(args.config.as_deref(), project_id)?;
            if !workspace.open().await {
                return Err("failed to open project".into());
            }
            workspace.wait_until_idle().await;
            finish(&workspace, out)?;
        }
        Command::Generate { project_id, prompt } => {
            let mut workspace = open_workspace(args.config.as_deref(), project_id)?;
            if !workspace.open().await {
                return Err("failed to open project".into());
            }
            workspace.wait_until_idle().await;
            if !workspace.revise(&prompt).await {
                return Err("prompt was not accepted".into());
            }
            workspace.wait_until_idle().await;
            finish(&workspace, None)?;
        }
    }
    Ok(())
}

fn open_workspace(
    config_path: Option<&std::path::Path>,
    project_id: String,
) -> Result<ProjectWorkspace, Box<dyn std::error::Error>> {
    let config = ClientConfig::load(config_path)?;
    info!(base_url = %config.base_url, project = %project_id, "opening project");
    let backend = HttpBackend::new(&config)?;
    Ok(ProjectWorkspace::new(
        project_id,
        Arc::new(backend),
        Arc::new(TracingNotifier),
        config.poll_interval,
    ))
}

fn finish(workspace: &ProjectWorkspace, out: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let Some(code) = workspace.code() else {
        info!("project has no code yet");
        return Ok(());
    };
    match out {
        Some(dir) => {
            let name = workspace.project().and_then(|p| p.name.as_deref());
            let path = export::write_download(&dir, name, code)?;
            info!(path = %path.display(), "saved");
        }
        None => println!("{}", code),
    }
    Ok(())
}

fn setup_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("sitegen_client=debug,sitegen_preview=debug,info")
        } else {
            EnvFilter::new("info")
        }
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
