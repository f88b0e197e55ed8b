//! # Processor Configuration Module
//!
//! Chunk sizing and embedding batch settings, with a builder.

/// Configuration for chunking text
#[derive(Debug, Clone)]
pub struct ChunkOptions {
    /// Target size of each chunk in words
    pub target_chunk_size: usize,

    /// Size of overlap between chunks in words
    pub overlap_size: usize,
}

impl Default for ChunkOptions {
    fn default() -> Self {
        Self {
            target_chunk_size: 512,
            overlap_size: 20,
        }
    }
}

/// Configuration for the processor
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// Options for chunking
    pub chunk_options: ChunkOptions,

    /// Chunks sent to the embedding model per request
    pub embedding_batch_size: usize,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            chunk_options: ChunkOptions::default(),
            embedding_batch_size: 16,
        }
    }
}

/// Builder for ProcessorConfig
#[derive(Debug, Default)]
pub struct ProcessorConfigBuilder {
    config: ProcessorConfig,
}

impl ProcessorConfigBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            config: ProcessorConfig::default(),
        }
    }

    /// Set the chunk options
    pub fn chunk_options(mut self, chunk_options: ChunkOptions) -> Self {
        self.config.chunk_options = chunk_options;
        self
    }

    /// Set the target chunk size
    pub fn target_chunk_size(mut self, target_chunk_size: usize) -> Self {
        self.config.chunk_options.target_chunk_size = target_chunk_size;
        self
    }

    /// Set the overlap size
    pub fn overlap_size(mut self, overlap_size: usize) -> Self {
        self.config.chunk_options.overlap_size = overlap_size;
        self
    }

    pub fn embedding_batch_size(mut self, embedding_batch_size: usize) -> Self {
        self.config.embedding_batch_size = embedding_batch_size;
        self
    }

    /// Build the configuration
    pub fn build(self) -> ProcessorConfig {
        self.config
    }
}

impl ProcessorConfig {
    /// Create a new builder
    pub fn builder() -> ProcessorConfigBuilder {
        ProcessorConfigBuilder::new()
    }
}
