use rig::embeddings::Embedding;

/// Conversions between rig embeddings and the `f32` form they are stored in.
///
/// The binary form is the little-endian `f32` encoding of each dimension.
pub trait EmbeddingConversion {
    fn to_vec(&self) -> Vec<f32>;
    fn from_vec(vec: Vec<f32>) -> Self;
    fn to_binary(&self) -> Vec<u8>;
    fn from_binary(binary: &[u8]) -> Self;
}

impl EmbeddingConversion for Embedding {
    fn to_vec(&self) -> Vec<f32> {
        self.vec.iter().map(|f| *f as f32).collect()
    }

    fn from_vec(vec: Vec<f32>) -> Self {
        Self {
            vec: vec.into_iter().map(f64::from).collect(),
            document: String::new(),
        }
    }

    fn to_binary(&self) -> Vec<u8> {
        self.to_vec().into_iter().flat_map(f32::to_le_bytes).collect()
    }

    /// Trailing bytes that do not fill a whole `f32` are ignored
    fn from_binary(binary: &[u8]) -> Self {
        Self::from_vec(
            binary
                .chunks_exact(4)
                .map(|bytes| f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binary_layout() {
        let embedding = Embedding::from_vec(vec![1.0, -0.5]);
        let binary = embedding.to_binary();
        assert_eq!(binary.len(), 8);
        assert_eq!(&binary[..4], &1.0f32.to_le_bytes());
        assert_eq!(Embedding::from_binary(&binary).to_vec(), vec![1.0, -0.5]);
    }

    #[test]
    fn test_precision_is_f32() {
        let embedding = Embedding {
            document: "Doors open at 9am".to_string(),
            vec: vec![0.1],
        };
        let restored = Embedding::from_binary(&embedding.to_binary());
        assert_eq!(restored.vec[0], 0.1f32 as f64);
        assert!(restored.document.is_empty());
    }
}
