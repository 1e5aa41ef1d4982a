use clap::{ArgAction, Parser, Subcommand};
use hyde::generate::{Generator, RunStatus};
use hyde::{config, output, scaffold};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "hyde")]
#[command(about = "Incremental static site generator")]
#[command(long_about = "\
Incremental static site generator

A site is a folder with a site.yaml, content, layouts, and static files.
`hyde gen` publishes it into the deploy folder and, on later runs, only
re-renders what changed.

Site structure:

  site/
  ├── site.yaml                # Site config (run 'hyde gen-config' for all options)
  ├── layout/                  # Templates, never published
  │   └── base.html            # {{ title }} and {{ content }} are substituted
  ├── content/                 # Pages; content/ is dropped from output paths
  │   ├── index.md             # → deploy/index.html
  │   └── blog/post.html       # → deploy/blog/post.html
  ├── media/css/site.css       # Static, copied as-is → deploy/media/css/site.css
  └── deploy/                  # Output (deploy_path)

Pages pick a layout with TOML front matter:

  +++
  layout = \"base.html\"
  title = \"About\"
  +++

Set RUST_LOG=debug to see every planning decision.")]
#[command(version, disable_version_flag = true)]
struct Cli {
    /// Print version
    #[arg(short = 'v', long, action = ArgAction::Version)]
    version: Option<bool>,

    /// Site folder
    #[arg(short, long, default_value = ".", global = true)]
    sitepath: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create a new site from a layout
    Create {
        /// Layout to copy ($HYDE_LAYOUTS/<name>, or the built-in 'basic')
        #[arg(short, long, default_value = scaffold::DEFAULT_LAYOUT)]
        layout: String,
        /// Write into a non-empty folder
        #[arg(short, long)]
        force: bool,
    },
    /// Generate the site into the deploy folder
    Gen {
        /// Config file, relative to the site folder
        #[arg(short, long, default_value = config::DEFAULT_CONFIG_FILE)]
        config_path: PathBuf,
        /// Override the configured deploy path
        #[arg(short, long)]
        deploy_path: Option<String>,
    },
    /// Print a stock site.yaml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Command::Create { layout, force } => {
            let files = scaffold::create(&cli.sitepath, &layout, force)?;
            output::print_create(&cli.sitepath, &layout, &files);
        }
        Command::Gen {
            config_path,
            deploy_path,
        } => {
            let mut site_config = config::load_config(&cli.sitepath, &config_path)?;
            if let Some(deploy_path) = deploy_path {
                site_config = site_config.with_deploy_path(&deploy_path)?;
            }
            let generator = Generator::new(site_config);
            let report = generator.generate_all()?;
            output::print_report(&report);
            if report.status == RunStatus::PartiallyFailed {
                let failed = report.summary().failed;
                return Err(format!("{failed} resource(s) failed to generate").into());
            }
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_yaml());
        }
    }

    Ok(())
}
