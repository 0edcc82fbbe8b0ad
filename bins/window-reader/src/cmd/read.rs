use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use envelope_codec::EnvelopeCodec;
use stream_memory::MemoryStreamService;
use window_engine::{ShardWalker, WindowReader, WindowRequest};

use crate::config::{ReadArgs, ReaderConfig};
use crate::error::ReaderError;

pub async fn run(args: ReadArgs) -> Result<(), ReaderError> {
    // --- Load config ---
    let config = ReaderConfig::load_or_default(args.config.as_deref())?;
    if let Some(path) = &args.config {
        tracing::info!(config = %path, "loaded config");
    }

    // --- Load captured streams ---
    let service = Arc::new(MemoryStreamService::default());
    for stream_cfg in &config.streams {
        load(&service, &stream_cfg.name, &stream_cfg.dump).await?;
    }
    if let Some(dump) = &args.dump {
        load(&service, &args.stream, dump).await?;
    }

    // --- Reader ---
    let walker = ShardWalker::new(service)
        .with_shard_id(config.shard_id.clone())
        .with_limits(config.walk_limits())
        .with_retry(config.retry_policy());
    let verify = config.verify_checksums && !args.no_verify_checksums;
    let reader = WindowReader::new(walker, EnvelopeCodec::new(verify));

    let mut request = WindowRequest::new(args.stream.clone()).with_criteria(args.criteria());
    request.duration_minutes = args.minutes;

    // --- Ctrl+C cancels the request ---
    let token = CancellationToken::new();
    let signal_token = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupted, cancelling read");
            signal_token.cancel();
        }
    });

    let result = if args.from_start {
        reader.read_from_start(&request, &token).await?
    } else {
        reader.read(&request, &token).await?
    };

    let out = if args.pretty {
        serde_json::to_string_pretty(&result)?
    } else {
        serde_json::to_string(&result)?
    };
    println!("{out}");
    Ok(())
}

async fn load(service: &MemoryStreamService, stream: &str, dump: &str) -> Result<(), ReaderError> {
    let count = service
        .load_dump(stream, dump)
        .await
        .map_err(|source| ReaderError::Dump { stream: stream.to_string(), source })?;
    tracing::info!(stream, dump, records = count, "loaded dump");
    Ok(())
}
