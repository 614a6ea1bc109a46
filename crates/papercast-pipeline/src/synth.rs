//! Chunk synthesis fan-out.
//!
//! Chunks are synthesized concurrently on a [`JoinSet`] with a semaphore
//! bounding in-flight requests. Results are reassembled by chunk index, so
//! completion order never leaks into the stitched audio. Dropping the future
//! aborts every outstanding task.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

use papercast_core::config::TtsConfig;
use papercast_core::error::{UpstreamError, with_timeout};
use papercast_core::types::{AudioClip, TextChunk};
use papercast_media::{SpeechSynthesizer, SynthesisError, VoiceConfig};

/// How chunks are fanned out.
#[derive(Debug, Clone)]
pub struct SynthesisPlan {
    pub max_concurrency: usize,
    /// Extra attempts per chunk after the first failure.
    pub retries: u32,
    pub timeout: Duration,
    /// Base delay; attempt `n` waits `n * backoff`.
    pub backoff: Duration,
}

impl SynthesisPlan {
    pub fn from_config(config: &TtsConfig) -> Self {
        Self {
            max_concurrency: config.max_concurrency.max(1),
            retries: config.retries,
            timeout: config.timeout(),
            backoff: Duration::from_millis(500),
        }
    }
}

/// Outcome of synthesizing every chunk of one script.
#[derive(Debug, Default)]
pub struct SynthesisReport {
    /// Successful clips, ordered by chunk index.
    pub clips: Vec<(usize, AudioClip)>,
    /// Failures, ordered by chunk index.
    pub failures: Vec<SynthesisError>,
}

impl SynthesisReport {
    pub fn failed_indices(&self) -> Vec<usize> {
        self.failures.iter().map(|f| f.index).collect()
    }

    pub fn into_clips(self) -> Vec<AudioClip> {
        self.clips.into_iter().map(|(_, clip)| clip).collect()
    }
}

async fn synthesize_with_retry(
    synth: &dyn SpeechSynthesizer,
    chunk: &TextChunk,
    voice: &VoiceConfig,
    plan: &SynthesisPlan,
) -> Result<AudioClip, SynthesisError> {
    let mut attempt = 0;
    loop {
        let result = with_timeout(synth.id(), plan.timeout, async {
            synth.synthesize(chunk, voice).await.map_err(|e| e.source)
        })
        .await;

        match result {
            Ok(clip) => return Ok(clip),
            Err(err) if attempt < plan.retries => {
                attempt += 1;
                warn!(index = chunk.index, attempt, error = %err, "Chunk synthesis failed, retrying");
                tokio::time::sleep(plan.backoff * attempt).await;
            }
            Err(err) => return Err(SynthesisError::new(chunk.index, err)),
        }
    }
}

/// Synthesize every chunk, tolerating individual failures.
pub async fn synthesize_chunks(
    synth: Arc<dyn SpeechSynthesizer>,
    chunks: Vec<TextChunk>,
    voice: VoiceConfig,
    plan: &SynthesisPlan,
) -> SynthesisReport {
    let semaphore = Arc::new(Semaphore::new(plan.max_concurrency.max(1)));
    let voice = Arc::new(voice);
    let mut pending: BTreeSet<usize> = chunks.iter().map(|c| c.index).collect();
    let mut set = JoinSet::new();

    for chunk in chunks {
        let synth = Arc::clone(&synth);
        let semaphore = Arc::clone(&semaphore);
        let voice = Arc::clone(&voice);
        let plan = plan.clone();
        set.spawn(async move {
            let result = match semaphore.acquire_owned().await {
                Ok(_permit) => synthesize_with_retry(synth.as_ref(), &chunk, &voice, &plan).await,
                Err(_) => Err(SynthesisError::new(
                    chunk.index,
                    UpstreamError::transport(synth.id(), "synthesis cancelled"),
                )),
            };
            (chunk.index, result)
        });
    }

    let mut report = SynthesisReport::default();
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((index, result)) => {
                pending.remove(&index);
                match result {
                    Ok(clip) => {
                        debug!(index, bytes = clip.data.len(), "Chunk synthesized");
                        report.clips.push((index, clip));
                    }
                    Err(err) => {
                        warn!(index, error = %err.source, "Chunk synthesis failed");
                        report.failures.push(err);
                    }
                }
            }
            Err(e) => error!(error = %e, "Synthesis task did not complete"),
        }
    }

    // Tasks that panicked never reported their index.
    for index in pending {
        report.failures.push(SynthesisError::new(
            index,
            UpstreamError::invalid(synth.id(), "synthesis task aborted"),
        ));
    }

    report.clips.sort_by_key(|(index, _)| *index);
    report.failures.sort_by_key(|f| f.index);
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use papercast_core::types::AudioFormat;

    /// Encodes the chunk index in the clip and fails or stalls on request.
    #[derive(Default)]
    struct ScriptedTts {
        fail: Vec<usize>,
        /// Number of initial failures before a chunk succeeds.
        flaky: HashMap<usize, usize>,
        stall: Vec<usize>,
        delays_ms: HashMap<usize, u64>,
        calls: Mutex<HashMap<usize, usize>>,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl SpeechSynthesizer for ScriptedTts {
        fn id(&self) -> &str {
            "scripted"
        }

        async fn synthesize(
            &self,
            chunk: &TextChunk,
            voice: &VoiceConfig,
        ) -> Result<AudioClip, SynthesisError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);

            let call = {
                let mut calls = self.calls.lock().unwrap();
                let n = calls.entry(chunk.index).or_default();
                *n += 1;
                *n
            };
            if let Some(ms) = self.delays_ms.get(&chunk.index) {
                tokio::time::sleep(Duration::from_millis(*ms)).await;
            }
            if self.stall.contains(&chunk.index) {
                tokio::time::sleep(Duration::from_secs(30)).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            let flaky_failures = self.flaky.get(&chunk.index).copied().unwrap_or(0);
            if self.fail.contains(&chunk.index) || call <= flaky_failures {
                return Err(SynthesisError::new(
                    chunk.index,
                    UpstreamError::Status {
                        service: "scripted".into(),
                        status: 503,
                        body: "busy".into(),
                    },
                ));
            }
            let sample = chunk.index as i16;
            Ok(AudioClip::new(
                AudioFormat::pcm16(voice.sample_rate, 1),
                [sample, sample].iter().flat_map(|s| s.to_le_bytes()).collect(),
            ))
        }
    }

    fn chunks(n: usize) -> Vec<TextChunk> {
        (0..n)
            .map(|index| TextChunk {
                index,
                text: format!("Sentence {index}."),
            })
            .collect()
    }

    fn voice() -> VoiceConfig {
        VoiceConfig {
            language_code: "en-US".into(),
            voice_id: None,
            sample_rate: 16_000,
        }
    }

    fn plan() -> SynthesisPlan {
        SynthesisPlan {
            max_concurrency: 4,
            retries: 0,
            timeout: Duration::from_secs(5),
            backoff: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn test_middle_failure_is_reported() {
        let tts = Arc::new(ScriptedTts {
            fail: vec![1],
            ..Default::default()
        });
        let report = synthesize_chunks(tts, chunks(3), voice(), &plan()).await;
        let indices: Vec<usize> = report.clips.iter().map(|(i, _)| *i).collect();
        assert_eq!(indices, vec![0, 2]);
        assert_eq!(report.failed_indices(), vec![1]);
    }

    #[tokio::test]
    async fn test_order_restored_despite_completion_order() {
        let tts = Arc::new(ScriptedTts {
            delays_ms: [(0, 60), (1, 30), (2, 0)].into_iter().collect(),
            ..Default::default()
        });
        let report = synthesize_chunks(tts, chunks(3), voice(), &plan()).await;
        let first_samples: Vec<u8> = report.into_clips().iter().map(|c| c.data[0]).collect();
        assert_eq!(first_samples, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let tts = Arc::new(ScriptedTts {
            delays_ms: (0..8).map(|i| (i, 20)).collect(),
            ..Default::default()
        });
        let plan = SynthesisPlan {
            max_concurrency: 2,
            ..plan()
        };
        let report = synthesize_chunks(tts.clone(), chunks(8), voice(), &plan).await;
        assert_eq!(report.clips.len(), 8);
        assert!(tts.peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_retries_recover_flaky_chunk() {
        let tts = Arc::new(ScriptedTts {
            flaky: [(0, 2)].into_iter().collect(),
            ..Default::default()
        });
        let plan = SynthesisPlan {
            retries: 2,
            ..plan()
        };
        let report = synthesize_chunks(tts.clone(), chunks(1), voice(), &plan).await;
        assert_eq!(report.clips.len(), 1);
        assert_eq!(tts.calls.lock().unwrap()[&0], 3);
    }

    #[tokio::test]
    async fn test_no_retry_by_default() {
        let tts = Arc::new(ScriptedTts {
            flaky: [(0, 1)].into_iter().collect(),
            ..Default::default()
        });
        let report = synthesize_chunks(tts.clone(), chunks(1), voice(), &plan()).await;
        assert_eq!(report.failed_indices(), vec![0]);
        assert_eq!(tts.calls.lock().unwrap()[&0], 1);
    }

    #[tokio::test]
    async fn test_stalled_chunk_times_out() {
        let tts = Arc::new(ScriptedTts {
            stall: vec![1],
            ..Default::default()
        });
        let plan = SynthesisPlan {
            timeout: Duration::from_millis(50),
            ..plan()
        };
        let report = synthesize_chunks(tts, chunks(2), voice(), &plan).await;
        assert_eq!(report.failed_indices(), vec![1]);
        assert!(report.failures[0].source.is_timeout());
    }
}
