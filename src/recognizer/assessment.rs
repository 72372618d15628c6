use serde::{Deserialize, Serialize};

/// Scores for one recognized utterance
///
/// Scores use the hundred-mark scale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PronunciationScores {
    pub accuracy: f64,
    pub fluency: f64,
    pub completeness: f64,
    /// Overall pronunciation score
    pub pronunciation: f64,
    pub prosody: Option<f64>,
    /// Present when topic-based content assessment was enabled
    pub content: Option<ContentScores>,
    pub words: Vec<WordAssessment>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentScores {
    pub grammar: f64,
    pub vocabulary: f64,
    pub topic: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordAssessment {
    pub word: String,
    pub accuracy: f64,
    /// "None", "Omission", "Insertion", "Mispronunciation", ...
    pub error_type: String,
}

// Detailed result layout

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DetailedResult {
    #[serde(default, rename = "NBest")]
    n_best: Vec<Hypothesis>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Hypothesis {
    pronunciation_assessment: Option<UtteranceAssessment>,
    content_assessment: Option<ContentAssessment>,
    #[serde(default)]
    words: Vec<Word>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct UtteranceAssessment {
    #[serde(default)]
    accuracy_score: f64,
    #[serde(default)]
    fluency_score: f64,
    #[serde(default)]
    completeness_score: f64,
    #[serde(default)]
    pron_score: f64,
    prosody_score: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ContentAssessment {
    #[serde(default)]
    grammar_score: f64,
    #[serde(default)]
    vocabulary_score: f64,
    #[serde(default)]
    topic_score: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Word {
    word: String,
    pronunciation_assessment: Option<WordScore>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WordScore {
    #[serde(default)]
    accuracy_score: f64,
    #[serde(default = "no_error")]
    error_type: String,
}

fn no_error() -> String {
    "None".to_string()
}

impl PronunciationScores {
    /// Derive scores from a detailed recognition result
    ///
    /// `None` when the JSON is unparsable or the best hypothesis carries no
    /// pronunciation assessment.
    pub fn from_detailed_json(json: &str) -> Option<Self> {
        let result: DetailedResult = serde_json::from_str(json).ok()?;
        let best = result.n_best.into_iter().next()?;
        let assessment = best.pronunciation_assessment?;

        let words = best
            .words
            .into_iter()
            .map(|word| {
                let (accuracy, error_type) = word
                    .pronunciation_assessment
                    .map(|score| (score.accuracy_score, score.error_type))
                    .unwrap_or((0.0, no_error()));
                WordAssessment {
                    word: word.word,
                    accuracy,
                    error_type,
                }
            })
            .collect();

        Some(Self {
            accuracy: assessment.accuracy_score,
            fluency: assessment.fluency_score,
            completeness: assessment.completeness_score,
            pronunciation: assessment.pron_score,
            prosody: assessment.prosody_score,
            content: best.content_assessment.map(|content| ContentScores {
                grammar: content.grammar_score,
                vocabulary: content.vocabulary_score,
                topic: content.topic_score,
            }),
            words,
        })
    }

    /// Words flagged with anything other than `None`
    pub fn mispronounced_words(&self) -> impl Iterator<Item = &WordAssessment> {
        self.words.iter().filter(|w| w.error_type != "None")
    }
}
