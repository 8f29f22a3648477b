//! Embedding transport codec.
//!
//! Embeddings cross the wire either as raw floats or sign-bit-packed i8
//! bytes (one byte per 8 dimensions). Either way the vector is first
//! reconciled to the engine's configured transport dimension by truncating
//! (Matryoshka-capable models keep their leading dimensions) or zero-padding.

use serde::{Deserialize, Serialize};

use super::error::EngineError;

/// How embedding vectors are encoded for the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportEncoding {
    /// Pass floats through unchanged.
    #[default]
    Float,
    /// One sign bit per dimension, packed MSB-first into i8 bytes.
    PackedInt8,
}

/// An embedding ready for transmission.
#[derive(Debug, Clone, PartialEq)]
pub enum EncodedEmbedding {
    Float(Vec<f32>),
    Packed(Vec<i8>),
}

impl EncodedEmbedding {
    /// JSON value for the engine's `{"values": [...]}` tensor format and
    /// the `input.query(query_embedding)` parameter.
    pub fn to_json_values(&self) -> serde_json::Value {
        match self {
            EncodedEmbedding::Float(values) => serde_json::json!(values),
            EncodedEmbedding::Packed(values) => serde_json::json!(values),
        }
    }
}

/// Truncate or zero-pad a vector to `target_dim`.
pub fn normalise(embedding: &[f32], target_dim: usize) -> Vec<f32> {
    let mut values: Vec<f32> = embedding.iter().take(target_dim).copied().collect();
    values.resize(target_dim, 0.0);
    values
}

/// Fixed-dimension codec for one document type.
#[derive(Debug, Clone)]
pub struct EmbeddingCodec {
    dim: usize,
    encoding: TransportEncoding,
}

impl EmbeddingCodec {
    /// Build a codec for the given transport dimension.
    ///
    /// Packed encoding requires the dimension to be divisible by 8; that is
    /// a configuration error and is rejected here, not at call time.
    pub fn new(dim: usize, encoding: TransportEncoding) -> Result<Self, EngineError> {
        if dim == 0 {
            return Err(EngineError::Configuration(
                "embedding dimension must be greater than zero".to_string(),
            ));
        }
        if encoding == TransportEncoding::PackedInt8 && dim % 8 != 0 {
            return Err(EngineError::Configuration(format!(
                "packed embedding dimension must be divisible by 8, got {dim}"
            )));
        }
        Ok(Self { dim, encoding })
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Encode a raw embedding for transmission, reconciling its length to
    /// the transport dimension first.
    pub fn encode(&self, embedding: &[f32]) -> EncodedEmbedding {
        let values = normalise(embedding, self.dim);
        match self.encoding {
            TransportEncoding::Float => EncodedEmbedding::Float(values),
            TransportEncoding::PackedInt8 => EncodedEmbedding::Packed(pack_bits(&values)),
        }
    }
}

/// Pack sign bits into i8 bytes, MSB-first within each byte.
///
/// Bit 7 of byte 0 corresponds to dimension 0. A value is 1 iff strictly
/// positive; zero packs to 0. The assembled unsigned byte is reinterpreted
/// as two's-complement i8. Callers guarantee `values.len() % 8 == 0`
/// (enforced by [`EmbeddingCodec::new`]).
fn pack_bits(values: &[f32]) -> Vec<i8> {
    values
        .chunks_exact(8)
        .map(|group| {
            let mut byte = 0u8;
            for (i, v) in group.iter().enumerate() {
                if *v > 0.0 {
                    byte |= 1 << (7 - i);
                }
            }
            byte as i8
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalise_truncates_leading_dims() {
        let long: Vec<f32> = (0..768).map(|i| i as f32).collect();
        let out = normalise(&long, 256);
        assert_eq!(out.len(), 256);
        assert_eq!(out[..], long[..256]);
    }

    #[test]
    fn test_normalise_zero_pads() {
        let out = normalise(&[1.0, 2.0], 4);
        assert_eq!(out, vec![1.0, 2.0, 0.0, 0.0]);
    }

    #[test]
    fn test_pack_bits_sign_bits_msb_first() {
        // 10011010 -> 154 -> -102 as i8; zero is not positive
        let codec = EmbeddingCodec::new(8, TransportEncoding::PackedInt8).unwrap();
        let encoded = codec.encode(&[0.5, -0.1, 0.0, 9.2, 3.4, -2.0, 8.1, -7.0]);
        assert_eq!(encoded, EncodedEmbedding::Packed(vec![-102]));
    }

    #[test]
    fn test_pack_bits_all_positive_and_all_negative() {
        let codec = EmbeddingCodec::new(8, TransportEncoding::PackedInt8).unwrap();
        assert_eq!(
            codec.encode(&[1.0; 8]),
            EncodedEmbedding::Packed(vec![-1]) // 0xFF
        );
        assert_eq!(codec.encode(&[-1.0; 8]), EncodedEmbedding::Packed(vec![0]));
    }

    #[test]
    fn test_packed_dim_must_be_multiple_of_8() {
        let err = EmbeddingCodec::new(12, TransportEncoding::PackedInt8).unwrap_err();
        assert_eq!(err.kind(), "configuration");

        // Float transport has no divisibility requirement.
        assert!(EmbeddingCodec::new(12, TransportEncoding::Float).is_ok());
    }

    #[test]
    fn test_zero_dim_rejected() {
        assert!(EmbeddingCodec::new(0, TransportEncoding::Float).is_err());
    }

    #[test]
    fn test_float_encode_reconciles_dimension() {
        let codec = EmbeddingCodec::new(4, TransportEncoding::Float).unwrap();
        assert_eq!(
            codec.encode(&[0.1, 0.2]),
            EncodedEmbedding::Float(vec![0.1, 0.2, 0.0, 0.0])
        );
        assert_eq!(
            codec.encode(&[0.1, 0.2, 0.3, 0.4, 0.5]),
            EncodedEmbedding::Float(vec![0.1, 0.2, 0.3, 0.4])
        );
    }
}
