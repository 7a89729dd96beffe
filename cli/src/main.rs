use agent::config::engine_id_from_env;
use agent::{
    AgentEngineClient, DeployConfig, DeploySpec, DeployedAgent, EventStream, corp_brand_agent,
    parse_event_content,
};
use anyhow::{Context, anyhow};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use std::path::PathBuf;
use std::time::Instant;
use storage::{GcsClient, check_or_create_gcs_bucket_with_url, resolve_access_token};
use tracing_subscriber::EnvFilter;

mod chat;

const DEFAULT_USER_ID: &str = "user";
const DEPLOY_MESSAGE: &str =
    "Hi teacher. Could she help me to multiply all the numbers between 1 and 10?";
const QUERY_MESSAGE: &str =
    "Hi teacher. Could she help me to multiply all the numbers between 1 and 10 and then add 5?";

// CLIの引数構造体定義
#[derive(Parser)]
#[command(name = "agent-cli")]
#[command(about = "Deploy and query a news/brand agent on Vertex AI Agent Engine", long_about = None)]
struct Cli {
    /// プロジェクトID（省略時は GOOGLE_CLOUD_PROJECT）
    #[arg(long, global = true)]
    project: Option<String>,

    /// リージョン（省略時は GOOGLE_CLOUD_LOCATION）
    #[arg(long, global = true)]
    location: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// ステージング用バケットを確認・作成します
    Provision,

    /// エージェントをデプロイし、セッションを作成して1回問い合わせます
    Deploy {
        /// 一緒にアップロードするローカルのパッケージ（複数指定可）
        #[arg(long = "extra-package")]
        extra_packages: Vec<PathBuf>,

        /// ホスト側のトレースを無効にする
        #[arg(long)]
        no_tracing: bool,

        #[arg(long, default_value = DEFAULT_USER_ID)]
        user_id: String,

        #[arg(long, default_value = DEPLOY_MESSAGE)]
        message: String,
    },

    /// デプロイ済みエージェントに1回問い合わせます
    Query {
        /// エンジンID（省略時は AGENT_ENGINE_ID）
        #[arg(long)]
        engine_id: Option<String>,

        #[arg(long, default_value = DEFAULT_USER_ID)]
        user_id: String,

        /// 既存のセッションID（省略時はランタイム側で新規作成）
        #[arg(long)]
        session_id: Option<String>,

        #[arg(long, default_value = QUERY_MESSAGE)]
        message: String,
    },

    /// デプロイ済みエージェントと対話します
    Chat {
        #[arg(long)]
        engine_id: Option<String>,

        #[arg(long, default_value = DEFAULT_USER_ID)]
        user_id: String,
    },

    /// デプロイ済みエージェントを削除します
    Delete {
        #[arg(long)]
        engine_id: Option<String>,

        /// セッションなどの子リソースも削除する
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    // 引数の解析
    let cli = Cli::parse();
    let config = DeployConfig::from_env(cli.project, cli.location)?;

    match cli.command {
        Commands::Provision => {
            let token = resolve_access_token().await?;
            provision(&config, &token).await?;
        }
        Commands::Deploy {
            extra_packages,
            no_tracing,
            user_id,
            message,
        } => {
            let spec = DeploySpec::new("agent_corp_brand")
                .with_extra_packages(extra_packages)
                .with_tracing(!no_tracing);
            deploy(&config, spec, &user_id, &message).await?;
        }
        Commands::Query {
            engine_id,
            user_id,
            session_id,
            message,
        } => {
            let deployed = connect(&config, engine_id).await?;
            print_banner("Send User Query");
            println!("User query: {}", message);
            let events = deployed
                .stream_query(&user_id, session_id.as_deref(), &message)
                .await?;
            print_events(events).await?;
        }
        Commands::Chat { engine_id, user_id } => {
            let deployed = connect(&config, engine_id).await?;
            chat::run_chat(&deployed, &user_id).await?;
        }
        Commands::Delete { engine_id, force } => {
            let deployed = connect(&config, engine_id).await?;
            print_banner("Deleting Remote Agent");
            deployed.delete(force).await?;
            println!("Deleted: {}", deployed.resource_name());
        }
    }

    Ok(())
}

/// バケットを準備し、失敗した場合はプロセスを終了する
async fn provision(config: &DeployConfig, token: &str) -> anyhow::Result<storage::Bucket> {
    let result = check_or_create_gcs_bucket_with_url(
        &config.bucket_name,
        &config.location,
        Some(config.project.as_str()),
        token,
    )
    .await?;

    match result {
        Some(provisioned) => {
            println!("Bucket is ready available to AgentEngine");
            println!("  Returned URL: {}", provisioned.url);
            println!("  Bucket Object Name: {}", provisioned.bucket.name);
            Ok(provisioned.bucket)
        }
        None => {
            tracing::error!(
                bucket = %config.bucket_name,
                "Failed to process AgentEngine bucket. Check logs and permissions."
            );
            std::process::exit(1);
        }
    }
}

/// デプロイからストリーミング問い合わせまでを実行する
///
/// リモートのエンジンは削除しない。不要になったら `delete` サブコマンドで削除する。
async fn deploy(
    config: &DeployConfig,
    spec: DeploySpec,
    user_id: &str,
    message: &str,
) -> anyhow::Result<()> {
    let token = resolve_access_token().await?;
    let bucket = provision(config, &token).await?;

    let staging = GcsClient::new(Some(config.project.clone()), token.clone());
    let client = AgentEngineClient::new(&config.project, &config.location, &token);
    let definition = corp_brand_agent(&config.model);

    print_banner("Deploying Agent");
    println!("Agent: {} (model: {})", definition.name(), config.model);
    let deployed = client
        .create(&definition, &spec, &staging, &bucket)
        .await
        .context("Failed to deploy agent")?;
    println!("Deployed: {}", deployed.resource_name());

    let session = deployed.create_session(user_id).await?;
    print_banner("New session details");
    println!("{}", serde_json::to_string_pretty(&session)?);

    print_banner("List sessions");
    let sessions = deployed.list_sessions(user_id).await?;
    println!("{}", serde_json::to_string_pretty(&sessions)?);

    print_banner("Get sessions");
    let session = deployed.get_session(user_id, &session.id).await?;
    println!("{}", serde_json::to_string_pretty(&session)?);

    print_banner("Interact with Agent");
    let start_time = Instant::now();
    let events = deployed
        .stream_query(user_id, Some(session.id.as_str()), message)
        .await?;
    let elapsed_ms = start_time.elapsed().as_secs_f64() * 1000.0;

    print_events(events).await?;
    println!("Stream opened in {:.3} ms", elapsed_ms);
    println!(
        "Remote agent kept. Delete it with: agent-cli delete --engine-id {}",
        deployed.resource_name()
    );

    Ok(())
}

/// エンジンIDを解決して既存のエンジンを取得する
async fn connect(config: &DeployConfig, engine_id: Option<String>) -> anyhow::Result<DeployedAgent> {
    let engine_id = engine_id
        .or_else(engine_id_from_env)
        .ok_or_else(|| anyhow!("Engine id is required (--engine-id or AGENT_ENGINE_ID)"))?;

    let token = resolve_access_token().await?;
    let client = AgentEngineClient::new(&config.project, &config.location, &token);

    print_banner("Get Agent Engine");
    let deployed = client.get(&engine_id).await?;
    println!("Agent Retrieved: {}", deployed.display_name());
    Ok(deployed)
}

/// イベントストリームを到着順に分類して表示する
async fn print_events(mut events: EventStream) -> anyhow::Result<usize> {
    let mut stdout = std::io::stdout();
    let mut count = 0;
    while let Some(event) = events.next().await {
        count += parse_event_content(&event?, &mut stdout).len();
    }
    Ok(count)
}

fn print_banner(title: &str) {
    println!("-----------------------------");
    println!(">>> {} <<<", title);
    println!("-----------------------------");
}
