/// Transcription results
///
/// Host-owned copies of what the native engine returns: the transcript text
/// plus per-word timing, confidence and speaker metadata.

use serde::{Deserialize, Serialize};

/// Speaker tag reported when diarization is disabled.
pub const SPEAKER_TAG_DISABLED: i32 = -1;

/// Speaker tag reserved for an unidentified speaker.
pub const SPEAKER_TAG_UNKNOWN: i32 = 0;

/// One transcribed word and its metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Word {
    /// Transcribed word
    pub word: String,

    /// Start of the word in seconds
    pub start_sec: f32,

    /// End of the word in seconds
    pub end_sec: f32,

    /// Confidence within [0, 1]
    pub confidence: f32,

    /// Speaker tag (-1 without diarization, 0 for an unknown speaker)
    pub speaker_tag: i32,
}

/// Transcript text with its words in order of occurrence
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    pub transcript: String,
    pub words: Vec<Word>,
}

/// A well-formedness problem found in native output.
#[derive(Debug, Clone, PartialEq)]
pub enum TranscriptIssue {
    /// Word `index` ends after word `index + 1` starts
    Overlap { index: usize },

    /// Word ends before it starts
    NegativeDuration { index: usize },

    /// Confidence outside [0, 1]
    ConfidenceOutOfRange { index: usize, confidence: f32 },

    /// Speaker tag below -1
    InvalidSpeakerTag { index: usize, speaker_tag: i32 },

    /// Last word ends after the audio does
    ExceedsDuration { end_sec: f32, duration_sec: f32 },
}

impl Transcript {
    pub fn is_empty(&self) -> bool {
        self.transcript.is_empty() && self.words.is_empty()
    }

    /// Distinct speaker tags, in order of first appearance.
    pub fn speakers(&self) -> Vec<i32> {
        let mut speakers = Vec::new();
        for word in &self.words {
            if word.speaker_tag != SPEAKER_TAG_DISABLED && !speakers.contains(&word.speaker_tag) {
                speakers.push(word.speaker_tag);
            }
        }
        speakers
    }

    /// Check the word sequence against the expected shape of native output.
    ///
    /// Issues are reported, not repaired: the native engine is the authority on
    /// its own output. `duration_sec` bounds the final word when known.
    pub fn validate(&self, duration_sec: Option<f32>) -> Vec<TranscriptIssue> {
        let mut issues = Vec::new();

        for (index, word) in self.words.iter().enumerate() {
            if word.end_sec < word.start_sec {
                issues.push(TranscriptIssue::NegativeDuration { index });
            }
            if !(0.0..=1.0).contains(&word.confidence) {
                issues.push(TranscriptIssue::ConfidenceOutOfRange {
                    index,
                    confidence: word.confidence,
                });
            }
            if word.speaker_tag < SPEAKER_TAG_DISABLED {
                issues.push(TranscriptIssue::InvalidSpeakerTag {
                    index,
                    speaker_tag: word.speaker_tag,
                });
            }
        }

        for (index, pair) in self.words.windows(2).enumerate() {
            if pair[0].end_sec > pair[1].start_sec {
                issues.push(TranscriptIssue::Overlap { index });
            }
        }

        if let (Some(duration_sec), Some(last)) = (duration_sec, self.words.last()) {
            if last.end_sec > duration_sec {
                issues.push(TranscriptIssue::ExceedsDuration {
                    end_sec: last.end_sec,
                    duration_sec,
                });
            }
        }

        issues
    }
}
