use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use finnews_retrieval_core::tools::{
    BenefitRecordsParams, SearchArticlesParams, SearchUsersParams, SEARCH_ARTICLES, SEARCH_USERS,
    USER_BENEFIT_RECORDS,
};
use finnews_retrieval_core::{
    build_policy, local_offset, render_call_result, ArticleRetriever, FinanceNewsServer,
    LooseNumber, OpenAiEmbedder, PayloadKeys, PolicyKind, PolicyThresholds, QdrantStore,
    SqliteStore, ToolBox, DEFAULT_EMBEDDING_DIMENSIONS, DEFAULT_EMBEDDING_MODEL,
    DEFAULT_UTC_OFFSET_SECONDS, SERVER_NAME,
};
use rmcp::handler::server::wrapper::Parameters;
use rmcp::transport::stdio;
use rmcp::ServiceExt;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "finnews-tools", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Qdrant base URL
    #[arg(long, env = "QDRANT_URL", default_value = "http://localhost:6333")]
    qdrant_url: String,

    /// Qdrant collection holding article chunks
    #[arg(long, env = "QDRANT_COLLECTION", default_value = "finance_news")]
    qdrant_collection: String,

    /// Vector size the collection was created with
    #[arg(long, env = "QDRANT_VECTOR_SIZE", default_value_t = DEFAULT_EMBEDDING_DIMENSIONS)]
    qdrant_vector_size: usize,

    /// OpenAI-compatible API base URL used for embeddings
    #[arg(long, env = "OPENAI_BASE_URL", default_value = "https://openrouter.ai/api/v1")]
    openai_base_url: String,

    /// API key for the embedding service
    #[arg(long, env = "OPENROUTER_API_KEY", default_value = "", hide_env_values = true)]
    openai_api_key: String,

    /// Embedding model name
    #[arg(long, env = "EMBEDDING_MODEL", default_value = DEFAULT_EMBEDDING_MODEL)]
    embedding_model: String,

    /// Requested embedding dimensions
    #[arg(long, env = "EMBEDDING_DIMENSIONS", default_value_t = DEFAULT_EMBEDDING_DIMENSIONS)]
    embedding_dimensions: usize,

    /// SQLite database with article bodies, users and benefit records
    #[arg(long, env = "FINNEWS_DB", default_value = "finnews.db")]
    database: String,

    /// Retrieval policy: threshold or score-floor
    #[arg(long, env = "RETRIEVAL_POLICY", default_value = "threshold")]
    policy: PolicyKind,

    /// Top score must exceed this for a full-document answer
    #[arg(long, env = "FULL_DOCUMENT_THRESHOLD", default_value_t = PolicyThresholds::default().full_document)]
    full_document_threshold: f32,

    /// Runner-up score must exceed this for a supplementary summary
    #[arg(long, env = "SUPPLEMENTARY_THRESHOLD", default_value_t = PolicyThresholds::default().supplementary)]
    supplementary_threshold: f32,

    /// Payload field carrying the article id
    #[arg(long, env = "PAYLOAD_ID_KEY", default_value = "id")]
    payload_id_key: String,

    /// Payload field carrying the indexed text
    #[arg(long, env = "PAYLOAD_TEXT_KEY", default_value = "textToIndex")]
    payload_text_key: String,

    /// Payload field carrying the creation time in epoch seconds
    #[arg(long, env = "PAYLOAD_CREATED_AT_KEY", default_value = "created_at")]
    payload_created_at_key: String,

    /// UTC offset, in seconds, of caller-supplied timestamps
    #[arg(long, env = "LOCAL_UTC_OFFSET_SECONDS", default_value_t = DEFAULT_UTC_OFFSET_SECONDS, allow_negative_numbers = true)]
    utc_offset_seconds: i32,
}

#[derive(Subcommand)]
enum Command {
    /// Print the MCP tool catalog as JSON.
    Tools,
    /// Create the relational tables if they do not exist.
    InitSchema,
    /// Semantic article search.
    SearchArticles {
        /// Natural-language question
        #[arg(long)]
        query: String,
        /// Minimum similarity (score-floor policy)
        #[arg(long)]
        score: Option<f64>,
        /// Number of passages to retrieve
        #[arg(long)]
        limit: Option<i64>,
        /// Range start, e.g. "2024-03-01 00:00:00"
        #[arg(long)]
        start_time: Option<String>,
        /// Range end, e.g. "2024-03-31 23:59:59"
        #[arg(long)]
        end_time: Option<String>,
    },
    /// Users registered in a time range.
    SearchUsers {
        #[arg(long)]
        start_time: String,
        #[arg(long)]
        end_time: String,
        #[arg(long)]
        limit: Option<i64>,
    },
    /// Free-access grants for users and columns.
    BenefitRecords {
        /// Repeatable user id
        #[arg(long = "user-id", required = true)]
        user_ids: Vec<i64>,
        /// Repeatable column id
        #[arg(long = "subject-id", required = true)]
        subject_ids: Vec<i64>,
    },
    /// Serve the tools over MCP on stdio.
    Serve,
}

fn build_server(
    cli: &Cli,
    store: SqliteStore,
    shutdown: CancellationToken,
) -> anyhow::Result<FinanceNewsServer> {
    let embedder = OpenAiEmbedder::new(
        &cli.openai_base_url,
        &cli.openai_api_key,
        &cli.embedding_model,
        cli.embedding_dimensions,
    )?;
    let keys = PayloadKeys {
        document_id: cli.payload_id_key.clone(),
        text: cli.payload_text_key.clone(),
        created_at: cli.payload_created_at_key.clone(),
    };
    let index = QdrantStore::new(
        &cli.qdrant_url,
        &cli.qdrant_collection,
        cli.qdrant_vector_size,
        keys.clone(),
    );
    let policy = build_policy(
        cli.policy,
        PolicyThresholds {
            full_document: cli.full_document_threshold,
            supplementary: cli.supplementary_threshold,
        },
    );

    let retriever = ArticleRetriever::new(embedder, index, store.clone(), policy, keys);
    let tools = ToolBox::new(retriever, store, local_offset(cli.utc_offset_seconds)?);
    Ok(FinanceNewsServer::new(tools, shutdown))
}

async fn serve_stdio(server: FinanceNewsServer, shutdown: CancellationToken) -> anyhow::Result<()> {
    info!(server = SERVER_NAME, "serving MCP on stdio");
    let service = server
        .serve(stdio())
        .await
        .context("failed to start MCP server")?;

    tokio::select! {
        quit = service.waiting() => {
            quit?;
            info!("MCP client disconnected");
        }
        _ = shutdown.cancelled() => info!("MCP server shutting down"),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        policy = %cli.policy,
        "finnews-tools boot"
    );

    if cli.openai_api_key.is_empty() {
        warn!("no embedding API key configured; article search will fail upstream");
    }

    if let Command::Tools = cli.command {
        println!(
            "{}",
            serde_json::to_string_pretty(&FinanceNewsServer::tool_catalog())?
        );
        return Ok(());
    }

    let store = SqliteStore::open(&cli.database)?;
    if let Command::InitSchema = cli.command {
        store.ensure_schema().await?;
        println!("schema ready in {}", cli.database);
        return Ok(());
    }

    let shutdown = CancellationToken::new();
    let on_interrupt = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling");
            on_interrupt.cancel();
        }
    });

    let server = build_server(&cli, store, shutdown.clone())?;
    let (tool, result) = match &cli.command {
        Command::Tools | Command::InitSchema => return Ok(()),
        Command::Serve => return serve_stdio(server, shutdown).await,
        Command::SearchArticles {
            query,
            score,
            limit,
            start_time,
            end_time,
        } => {
            let params = SearchArticlesParams {
                query: query.clone(),
                score: (*score).map(LooseNumber::from),
                limit: (*limit).map(LooseNumber::from),
                start_time: start_time.clone(),
                end_time: end_time.clone(),
            };
            (
                SEARCH_ARTICLES,
                server.search_articles(Parameters(params)).await,
            )
        }
        Command::SearchUsers {
            start_time,
            end_time,
            limit,
        } => {
            let params = SearchUsersParams {
                start_time: start_time.clone(),
                end_time: end_time.clone(),
                limit: (*limit).map(LooseNumber::from),
            };
            (SEARCH_USERS, server.search_users(Parameters(params)).await)
        }
        Command::BenefitRecords {
            user_ids,
            subject_ids,
        } => {
            let params = BenefitRecordsParams {
                user_ids: user_ids.iter().copied().map(LooseNumber::from).collect(),
                subject_ids: subject_ids.iter().copied().map(LooseNumber::from).collect(),
            };
            (
                USER_BENEFIT_RECORDS,
                server.get_user_benefit_records(Parameters(params)).await,
            )
        }
    };

    let result = result.map_err(|error| anyhow::anyhow!("{tool} failed: {}", error.message))?;
    let rendered = render_call_result(&result)?;
    if rendered.is_error {
        anyhow::bail!("{tool} failed: {}", rendered.text);
    }
    println!("{}", rendered.text);
    Ok(())
}
