use std::path::PathBuf;
use std::process::exit;

use clap::{Parser, Subcommand};
use papi_cli::{catalog_cmd, config_cmd, notify_cmd, render_cmd};
use papi_definitions::workload::WorkloadKind;

#[derive(Parser)]
#[command(name = "papi", about = "Operator CLI for the platform API broker")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Validate a config template without starting the server.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Dry-run the template renderer against a job template and user config.
    Template {
        #[command(subcommand)]
        action: TemplateAction,
    },
    /// Trigger operations on a running server's catalog.
    Catalog {
        #[command(subcommand)]
        action: CatalogAction,
    },
    /// Notification helpers.
    Notify {
        #[command(subcommand)]
        action: NotifyAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Parse and validate a config file.
    Validate { path: PathBuf },
}

#[derive(Subcommand)]
enum TemplateAction {
    /// Render a job template with a user config, printing the result.
    Render {
        #[arg(long, value_enum)]
        kind: CliWorkloadKind,
        #[arg(long)]
        workload_name: String,
        #[arg(long)]
        schema: PathBuf,
        #[arg(long)]
        config: PathBuf,
        #[arg(long)]
        template: PathBuf,
        #[arg(long, default_value = "vo-a")]
        namespace: String,
        #[arg(long, default_value = "deploy.example")]
        base_domain: String,
        #[arg(long, default_value = "operator")]
        owner: String,
        #[arg(long, default_value = "Operator")]
        owner_name: String,
        #[arg(long, default_value = "operator@example.org")]
        owner_email: String,
    },
}

#[derive(Copy, Clone, clap::ValueEnum)]
enum CliWorkloadKind {
    Module,
    Tool,
    TryMe,
    BatchInference,
    Snapshot,
    FunctionService,
}

impl From<CliWorkloadKind> for WorkloadKind {
    fn from(k: CliWorkloadKind) -> WorkloadKind {
        match k {
            CliWorkloadKind::Module => WorkloadKind::Module,
            CliWorkloadKind::Tool => WorkloadKind::Tool,
            CliWorkloadKind::TryMe => WorkloadKind::TryMe,
            CliWorkloadKind::BatchInference => WorkloadKind::BatchInference,
            CliWorkloadKind::Snapshot => WorkloadKind::Snapshot,
            CliWorkloadKind::FunctionService => WorkloadKind::FunctionService,
        }
    }
}

#[derive(Subcommand)]
enum CatalogAction {
    /// POST /v1/catalog/refresh on a running server.
    Refresh {
        #[arg(long)]
        server: String,
        #[arg(long)]
        admin_token: String,
    },
}

#[derive(Subcommand)]
enum NotifyAction {
    /// Send a test notification through the configured Mailer.
    TestSend {
        #[arg(long)]
        mailer_addr: String,
        #[arg(long, default_value = "papi@example.org")]
        from: String,
        #[arg(long)]
        to: String,
    },
}

#[tokio::main]
async fn main() {
    papi_cli::init();
    loggerv::init_quiet().ok();
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Config {
            action: ConfigAction::Validate { path },
        } => config_cmd::validate(&path),
        Command::Template {
            action:
                TemplateAction::Render {
                    kind,
                    workload_name,
                    schema,
                    config,
                    template,
                    namespace,
                    base_domain,
                    owner,
                    owner_name,
                    owner_email,
                },
        } => render_cmd::render_dry_run(render_cmd::RenderArgs {
            kind: kind.into(),
            workload_name: &workload_name,
            schema_path: &schema,
            config_path: &config,
            template_path: &template,
            namespace: &namespace,
            base_domain: &base_domain,
            owner: &owner,
            owner_name: &owner_name,
            owner_email: &owner_email,
        })
        .map(|out| {
            println!("{}", out);
        }),
        Command::Catalog {
            action: CatalogAction::Refresh { server, admin_token },
        } => catalog_cmd::refresh(&server, &admin_token),
        Command::Notify {
            action: NotifyAction::TestSend { mailer_addr, from, to },
        } => notify_cmd::test_send(&mailer_addr, &from, &to).await,
    };

    if let Err(e) = result {
        eprintln!("error: {}", e);
        exit(1);
    }
}
