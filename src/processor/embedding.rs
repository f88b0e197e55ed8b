//! Embedding generation for chunks and queries

use crate::index::SourceRef;
use crate::processor::error::ProcessError;
use crate::processor::{ProcessedChunk, TextChunk};
use rig::embeddings::{Embedding, EmbeddingModel};
use tracing::{debug, instrument};

/// Embed chunks in sequential batches, preserving order
#[instrument(skip(model, chunks), fields(chunks = chunks.len()))]
pub async fn embed_chunks<E: EmbeddingModel>(
    model: &E,
    chunks: Vec<(SourceRef, TextChunk)>,
    batch_size: usize,
) -> Result<Vec<ProcessedChunk>, ProcessError> {
    let batch_size = batch_size.clamp(1, E::MAX_DOCUMENTS.max(1));
    let mut processed = Vec::with_capacity(chunks.len());

    for batch in chunks.chunks(batch_size) {
        let texts: Vec<String> = batch.iter().map(|(_, chunk)| chunk.text.clone()).collect();
        let embeddings = model.embed_texts(texts).await?;
        if embeddings.len() != batch.len() {
            return Err(ProcessError::EmbeddingProcessing(format!(
                "expected {} embeddings, got {}",
                batch.len(),
                embeddings.len()
            )));
        }
        debug!(batch = batch.len(), "Embedded batch");

        for ((source, chunk), embedding) in batch.iter().zip(embeddings) {
            processed.push(ProcessedChunk {
                source: source.clone(),
                text: chunk.text.clone(),
                position: chunk.position,
                heading: chunk.heading.clone(),
                embedding,
            });
        }
    }

    Ok(processed)
}

/// Embed a single query text
pub async fn embed_query<E: EmbeddingModel>(
    model: &E,
    text: &str,
) -> Result<Embedding, ProcessError> {
    model
        .embed_texts(vec![text.to_string()])
        .await?
        .into_iter()
        .next()
        .ok_or(ProcessError::EmbeddingProcessing(
            "failed to extract embedding".to_string(),
        ))
}
