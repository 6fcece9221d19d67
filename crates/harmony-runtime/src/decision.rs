//! The DECIDE rule.

use harmony_types::{EmotionReading, SentimentLabel};

/// React when either the words or the faces are negative.
///
/// Only the most severe facial label counts, so one angry face among
/// several happy ones is enough.
pub fn should_react(sentiment: SentimentLabel, faces: &EmotionReading) -> bool {
    sentiment.is_negative() || faces.most_severe().is_negative()
}
