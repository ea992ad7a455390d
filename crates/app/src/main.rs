use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use plant_doctor_core::backends::{ncpms::DEFAULT_NCPMS_URL, openai::DEFAULT_OPENAI_URL};
use plant_doctor_core::{
    normalize_query, CharacterNgramEmbedder, Crop, DetailAnswer, Diagnosis, DoctorConfig, Embedder,
    IndexState, NcpmsCatalog, OpenAiChatGenerator, OpenAiEmbedder, PlantDoctor, SearchError,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "plant-doctor", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Directory holding one vector index per crop
    #[arg(long, env = "PLANT_DOCTOR_INDEX_DIR", default_value = "./crop_index")]
    index_dir: PathBuf,

    /// Directory for downloaded disease images
    #[arg(long, env = "PLANT_DOCTOR_IMAGE_DIR", default_value = "./crop_images")]
    image_dir: PathBuf,

    /// NCPMS service URL
    #[arg(long, env = "NCPMS_URL", default_value = DEFAULT_NCPMS_URL)]
    ncpms_url: String,

    /// NCPMS API key
    #[arg(long, env = "NCPMS_API_KEY", hide_env_values = true)]
    ncpms_api_key: Option<String>,

    /// OpenAI-compatible API base URL
    #[arg(long, env = "OPENAI_BASE_URL", default_value = DEFAULT_OPENAI_URL)]
    openai_url: String,

    /// OpenAI API key
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    openai_api_key: Option<String>,

    /// Embedding backend. Indexes must be queried with the backend that built them.
    #[arg(long, value_enum, default_value_t = EmbedderKind::Openai)]
    embedder: EmbedderKind,

    /// Embedding model for the openai backend
    #[arg(long, default_value = "text-embedding-3-small")]
    embedding_model: String,

    /// Chat model used for disease explanations
    #[arg(long, default_value = "gpt-4o-mini")]
    chat_model: String,

    /// Timeout for each backend request, in seconds
    #[arg(long, default_value = "30")]
    timeout_secs: u64,
}

#[derive(Clone, Copy, ValueEnum)]
enum EmbedderKind {
    /// Offline character n-gram embedder
    Local,
    /// OpenAI embeddings API
    Openai,
}

#[derive(Subcommand)]
enum Command {
    /// List supported crops.
    Crops,
    /// Show whether a crop has been indexed.
    Status {
        #[arg(long)]
        crop: String,
    },
    /// Collect disease data for a crop and (re)build its index.
    Build {
        #[arg(long)]
        crop: String,
    },
    /// Rank candidate diseases for a symptom description.
    Diagnose {
        #[arg(long)]
        crop: String,
        /// Free-text symptom description
        #[arg(long)]
        symptoms: String,
        /// Number of candidates to return.
        #[arg(long, default_value = "3")]
        top_k: usize,
        /// Seconds to wait for a background index build before giving up.
        #[arg(long, default_value = "0")]
        wait_secs: u64,
    },
    /// Explain cause, symptoms and prevention for one disease.
    Explain {
        #[arg(long)]
        crop: String,
        #[arg(long)]
        disease: String,
    },
    /// Print the processed form of a symptom description.
    Normalize {
        #[arg(long)]
        text: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        "plant-doctor boot"
    );

    match &cli.command {
        Command::Crops => {
            for crop in Crop::ALL {
                println!("{}\t{}", crop.display_name(), crop.code());
            }
            return Ok(());
        }
        Command::Normalize { text } => {
            println!("{}", normalize_query(text));
            return Ok(());
        }
        _ => {}
    }

    let doctor = build_doctor(&cli)?;

    let outcome = match cli.command {
        Command::Crops | Command::Normalize { .. } => Ok(()),
        Command::Status { crop } => doctor.state(&crop).map(|state| {
            println!("{crop}: {}", describe_state(state));
        }),
        Command::Build { crop } => {
            if cli.ncpms_api_key.is_none() {
                anyhow::bail!("NCPMS_API_KEY is required to collect disease data");
            }
            doctor.index_crop(&crop).await.map(|documents| {
                println!("{crop}: {documents} diseases indexed at {}", Utc::now().to_rfc3339());
            })
        }
        Command::Diagnose {
            crop,
            symptoms,
            top_k,
            wait_secs,
        } => match doctor.state(&crop) {
            Ok(state) if missing_catalog_key(state, cli.ncpms_api_key.as_deref()) => {
                anyhow::bail!("NCPMS_API_KEY is required to collect disease data for {crop}")
            }
            Ok(_) => diagnose(&doctor, &crop, &symptoms, top_k, wait_secs).await,
            Err(error) => Err(error),
        },
        Command::Explain { crop, disease } => {
            if cli.openai_api_key.is_none() {
                anyhow::bail!("OPENAI_API_KEY is required to explain a disease");
            }
            doctor.explain(&crop, &disease).await.map(|answer| match answer {
                DetailAnswer::Explained { disease, text } => println!("[{disease}]\n{text}"),
                DetailAnswer::NotFound { message, .. } => println!("{message}"),
            })
        }
    };

    match outcome {
        Ok(()) => Ok(()),
        Err(SearchError::UnsupportedCrop { crop }) => {
            anyhow::bail!(
                "'{crop}' is not a supported crop. Choose one of: {}",
                Crop::display_names().join(", ")
            )
        }
        Err(SearchError::IndexNotFound { crop }) => {
            println!("{crop}: disease data is still being prepared, try again shortly");
            Ok(())
        }
        Err(error) => Err(anyhow::anyhow!(error.to_string())),
    }
}

fn build_doctor(cli: &Cli) -> anyhow::Result<PlantDoctor> {
    let config = DoctorConfig {
        index_dir: cli.index_dir.clone(),
        image_dir: cli.image_dir.clone(),
        request_timeout: Duration::from_secs(cli.timeout_secs),
        embedding_model: cli.embedding_model.clone(),
        chat_model: cli.chat_model.clone(),
        ..DoctorConfig::default()
    };
    let openai_key = cli.openai_api_key.clone().unwrap_or_default();

    let embedder: Arc<dyn Embedder> = match cli.embedder {
        EmbedderKind::Local => Arc::new(CharacterNgramEmbedder::default()),
        EmbedderKind::Openai => {
            if openai_key.is_empty() {
                warn!("OPENAI_API_KEY is not set; embedding requests will fail");
            }
            Arc::new(OpenAiEmbedder::new(
                &cli.openai_url,
                openai_key.clone(),
                &config.embedding_model,
                config.request_timeout,
            )?)
        }
    };

    let generator = OpenAiChatGenerator::new(
        &cli.openai_url,
        openai_key,
        &config.chat_model,
        config.request_timeout,
    )?
    .with_temperature(config.chat_temperature);

    let catalog = NcpmsCatalog::new(
        &cli.ncpms_url,
        cli.ncpms_api_key.clone().unwrap_or_default(),
        config.request_timeout,
    )?;

    Ok(PlantDoctor::new(
        &config,
        Arc::new(catalog),
        embedder,
        Arc::new(generator),
    )?)
}

async fn diagnose(
    doctor: &PlantDoctor,
    crop: &str,
    symptoms: &str,
    top_k: usize,
    wait_secs: u64,
) -> Result<(), SearchError> {
    let mut waited = 0;
    loop {
        match doctor.diagnose(crop, symptoms, Some(top_k)).await? {
            Diagnosis::Ready {
                processed_query,
                hits,
            } => {
                println!("query: {processed_query}");
                if hits.is_empty() {
                    println!("no matching diseases");
                }
                for (rank, hit) in hits.iter().enumerate() {
                    println!("{}. {} (distance={:.4})", rank + 1, hit.disease_name, hit.score);
                    if !hit.image_path.is_empty() {
                        println!("   image={}", hit.image_path);
                    }
                }
                return Ok(());
            }
            Diagnosis::Preparing if waited < wait_secs => {
                tokio::time::sleep(Duration::from_secs(1)).await;
                waited += 1;
            }
            Diagnosis::Preparing => {
                println!("{crop}: disease data is still being prepared, try again shortly");
                return Ok(());
            }
        }
    }
}

/// A diagnosis on an unbuilt crop triggers collection, which needs the catalog key.
fn missing_catalog_key(state: IndexState, ncpms_api_key: Option<&str>) -> bool {
    state != IndexState::Ready && ncpms_api_key.map_or(true, str::is_empty)
}

fn describe_state(state: IndexState) -> &'static str {
    match state {
        IndexState::Unindexed => "not indexed",
        IndexState::Building => "building",
        IndexState::Ready => "ready",
    }
}
