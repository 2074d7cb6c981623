//! Speaker verification
//!
//! Wraps an external embedding extractor and compares utterance embeddings
//! against the enrolled template with cosine similarity.

use std::sync::Arc;

use async_trait::async_trait;

use crate::audio::{AudioClip, samples_to_wav};
use crate::enrollment::EnrollmentProfile;
use crate::{Error, Result};

/// Similarity threshold above which a speaker counts as matched
pub const MATCH_THRESHOLD: f32 = 0.75;

/// Extracts a fixed-length speaker embedding from an audio clip
#[async_trait]
pub trait EmbeddingExtractor: Send + Sync {
    /// Embed one utterance
    ///
    /// # Errors
    ///
    /// Returns error if the extractor is unreachable or rejects the clip
    async fn embed(&self, clip: &AudioClip) -> Result<Vec<f32>>;
}

/// Score of one verification attempt against an enrolled profile
#[derive(Debug, Clone, Copy)]
pub struct VerificationResult {
    /// Cosine similarity in `[-1, 1]`
    pub similarity: f32,
    /// Threshold the score was compared against
    pub threshold: f32,
    /// Whether the score cleared the threshold
    pub matched: bool,
}

/// Outcome of a verification attempt
///
/// "No enrollment" is distinguishable from a failed match so user feedback
/// can say which one happened.
#[derive(Debug, Clone, Copy)]
pub enum Verification {
    /// No profile is enrolled; always a non-match
    NoEnrollment,
    /// A profile was present and scored
    Scored(VerificationResult),
}

impl Verification {
    /// Whether this attempt counts as a positive match
    #[must_use]
    pub const fn matched(&self) -> bool {
        match self {
            Self::NoEnrollment => false,
            Self::Scored(result) => result.matched,
        }
    }
}

/// Verifies a speaker against an enrolled embedding template
pub struct SpeakerVerifier {
    extractor: Arc<dyn EmbeddingExtractor>,
    threshold: f32,
}

impl SpeakerVerifier {
    /// Create a verifier with the default threshold
    #[must_use]
    pub fn new(extractor: Arc<dyn EmbeddingExtractor>) -> Self {
        Self::with_threshold(extractor, MATCH_THRESHOLD)
    }

    /// Create a verifier with a custom threshold
    #[must_use]
    pub fn with_threshold(extractor: Arc<dyn EmbeddingExtractor>, threshold: f32) -> Self {
        Self {
            extractor,
            threshold,
        }
    }

    /// Build an enrollment profile from one or more sample clips
    ///
    /// Each clip is embedded separately and the embeddings are averaged
    /// componentwise. Multiple samples (canonically three) damp the effect
    /// of capture noise in any single recording.
    ///
    /// # Errors
    ///
    /// Returns error if no clips are given, embedding fails, or the
    /// extractor returns inconsistent vector lengths
    pub async fn enroll(&self, clips: &[AudioClip]) -> Result<EnrollmentProfile> {
        if clips.is_empty() {
            return Err(Error::Embedding(
                "at least one enrollment clip is required".to_string(),
            ));
        }

        let mut embeddings = Vec::with_capacity(clips.len());
        for clip in clips {
            embeddings.push(self.extractor.embed(clip).await?);
        }

        let dim = embeddings[0].len();
        if embeddings.iter().any(|e| e.len() != dim) {
            return Err(Error::Embedding(
                "extractor returned embeddings of differing lengths".to_string(),
            ));
        }

        let mut average = vec![0.0f32; dim];
        for embedding in &embeddings {
            for (slot, value) in average.iter_mut().zip(embedding) {
                *slot += value;
            }
        }
        let count = embeddings.len() as f32;
        for slot in &mut average {
            *slot /= count;
        }

        tracing::info!(samples = clips.len(), dim, "enrollment embedding averaged");
        Ok(EnrollmentProfile::new(average))
    }

    /// Score one clip against the enrolled profile
    ///
    /// # Errors
    ///
    /// Returns error only if embedding extraction fails; an absent profile
    /// is reported as [`Verification::NoEnrollment`], not an error
    pub async fn verify(
        &self,
        clip: &AudioClip,
        profile: Option<&EnrollmentProfile>,
    ) -> Result<Verification> {
        let Some(profile) = profile else {
            tracing::debug!("no enrolled profile, verification skipped");
            return Ok(Verification::NoEnrollment);
        };

        let embedding = self.extractor.embed(clip).await?;
        let similarity = cosine_similarity(profile.embedding(), &embedding);

        let result = VerificationResult {
            similarity,
            threshold: self.threshold,
            matched: similarity > self.threshold,
        };
        tracing::debug!(
            similarity = result.similarity,
            threshold = result.threshold,
            matched = result.matched,
            "speaker scored"
        );
        Ok(Verification::Scored(result))
    }
}

/// Compute cosine similarity between two vectors
///
/// Returns 0.0 if either vector has zero magnitude or the lengths differ,
/// so degenerate embeddings score as a non-match instead of dividing by
/// zero.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let mut dot = 0.0_f32;
    let mut norm_a = 0.0_f32;
    let mut norm_b = 0.0_f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 {
        return 0.0;
    }

    dot / denom
}

/// Embedding extraction via a speaker-encoder HTTP service
///
/// Posts the clip as WAV and expects `{"embedding": [..]}` back.
pub struct HttpEmbeddingExtractor {
    client: reqwest::Client,
    url: String,
}

#[derive(serde::Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

impl HttpEmbeddingExtractor {
    /// Create an extractor pointed at the given endpoint
    ///
    /// # Errors
    ///
    /// Returns error if the URL is empty
    pub fn new(url: String) -> Result<Self> {
        if url.is_empty() {
            return Err(Error::Config(
                "embedding service URL required for speaker verification".to_string(),
            ));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            url,
        })
    }
}

#[async_trait]
impl EmbeddingExtractor for HttpEmbeddingExtractor {
    async fn embed(&self, clip: &AudioClip) -> Result<Vec<f32>> {
        let wav = samples_to_wav(clip.samples(), clip.sample_rate())?;
        tracing::debug!(audio_bytes = wav.len(), "requesting speaker embedding");

        let response = self
            .client
            .post(&self.url)
            .header("Content-Type", "audio/wav")
            .body(wav)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "embedding request failed");
                e
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "embedding API error");
            return Err(Error::Embedding(format!(
                "embedding API error {status}: {body}"
            )));
        }

        let result: EmbeddingResponse = response.json().await?;
        if result.embedding.is_empty() {
            return Err(Error::Embedding("empty embedding returned".to_string()));
        }

        Ok(result.embedding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedExtractor {
        embeddings: Vec<Vec<f32>>,
        calls: std::sync::atomic::AtomicUsize,
    }

    impl FixedExtractor {
        fn new(embeddings: Vec<Vec<f32>>) -> Self {
            Self {
                embeddings,
                calls: std::sync::atomic::AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl EmbeddingExtractor for FixedExtractor {
        async fn embed(&self, _clip: &AudioClip) -> Result<Vec<f32>> {
            let i = self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(self.embeddings[i % self.embeddings.len()].clone())
        }
    }

    fn clip() -> AudioClip {
        AudioClip::new(vec![0.1; 160], 16000)
    }

    #[test]
    fn test_cosine_similarity_is_symmetric() {
        let a = [0.3, -0.7, 0.2];
        let b = [0.1, 0.4, -0.9];
        assert!((cosine_similarity(&a, &b) - cosine_similarity(&b, &a)).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_identical_vectors() {
        let a = [1.0, 2.0, 3.0];
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_zero_norm_is_non_match() {
        let zero = [0.0, 0.0];
        let other = [1.0, 1.0];
        assert!(cosine_similarity(&zero, &other).abs() < f32::EPSILON);
    }

    #[test]
    fn test_cosine_similarity_length_mismatch() {
        assert!(cosine_similarity(&[1.0], &[1.0, 0.0]).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn test_enroll_averages_componentwise() {
        let extractor = Arc::new(FixedExtractor::new(vec![
            vec![1.0, 0.0],
            vec![0.0, 1.0],
            vec![1.0, 1.0],
        ]));
        let verifier = SpeakerVerifier::new(extractor);

        let profile = verifier
            .enroll(&[clip(), clip(), clip()])
            .await
            .unwrap();

        let embedding = profile.embedding();
        assert!((embedding[0] - 2.0 / 3.0).abs() < 1e-4);
        assert!((embedding[1] - 2.0 / 3.0).abs() < 1e-4);
    }

    #[tokio::test]
    async fn test_enroll_requires_a_clip() {
        let extractor = Arc::new(FixedExtractor::new(vec![vec![1.0]]));
        let verifier = SpeakerVerifier::new(extractor);
        assert!(verifier.enroll(&[]).await.is_err());
    }

    #[tokio::test]
    async fn test_verify_without_profile_reports_no_enrollment() {
        let extractor = Arc::new(FixedExtractor::new(vec![vec![1.0, 0.0]]));
        let verifier = SpeakerVerifier::new(extractor);

        let verification = verifier.verify(&clip(), None).await.unwrap();
        assert!(matches!(verification, Verification::NoEnrollment));
        assert!(!verification.matched());
    }

    #[tokio::test]
    async fn test_verify_is_deterministic_for_fixed_embeddings() {
        let extractor = Arc::new(FixedExtractor::new(vec![vec![0.6, 0.8]]));
        let verifier = SpeakerVerifier::new(extractor);
        let profile = EnrollmentProfile::new(vec![0.6, 0.8]);

        for _ in 0..3 {
            let verification = verifier.verify(&clip(), Some(&profile)).await.unwrap();
            let Verification::Scored(result) = verification else {
                panic!("expected scored verification");
            };
            assert!((result.similarity - 1.0).abs() < 1e-6);
            assert!(result.matched);
        }
    }

    #[tokio::test]
    async fn test_verify_below_threshold_is_mismatch() {
        // Orthogonal to the profile: similarity 0.0
        let extractor = Arc::new(FixedExtractor::new(vec![vec![0.0, 1.0]]));
        let verifier = SpeakerVerifier::new(extractor);
        let profile = EnrollmentProfile::new(vec![1.0, 0.0]);

        let verification = verifier.verify(&clip(), Some(&profile)).await.unwrap();
        assert!(!verification.matched());
    }
}
