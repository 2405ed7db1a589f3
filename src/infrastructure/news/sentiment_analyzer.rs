//! Article sentiment scoring: financial keyword lexicons blended with VADER
//! NLP polarity.

use vader_sentiment::SentimentIntensityAnalyzer;

/// Negative sentiment keywords with severity weights.
const PANIC_WORDS: &[(&str, f64)] = &[
    ("crash", -0.85),
    ("plunge", -0.75),
    ("hack", -0.95),
    ("exploit", -0.90),
    ("ban", -0.65),
    ("fraud", -0.85),
    ("liquidation", -0.60),
    ("bearish", -0.45),
    ("sell-off", -0.65),
    ("dump", -0.60),
    ("fear", -0.45),
    ("collapse", -0.80),
    ("scam", -0.90),
    ("rug pull", -0.95),
    ("bankrupt", -0.85),
    ("shutdown", -0.70),
    ("regulation", -0.35),
    ("sec", -0.40),
    ("fine", -0.50),
    ("lawsuit", -0.55),
    ("congestion", -0.25),
    ("delay", -0.20),
    ("outage", -0.55),
    ("vulnerability", -0.65),
];

/// Positive sentiment keywords with intensity weights.
const EUPHORIA_WORDS: &[(&str, f64)] = &[
    ("surge", 0.75),
    ("rally", 0.65),
    ("bullish", 0.55),
    ("ath", 0.85),
    ("all-time high", 0.90),
    ("moon", 0.45),
    ("breakout", 0.65),
    ("adoption", 0.55),
    ("approval", 0.75),
    ("institutional", 0.60),
    ("record", 0.45),
    ("boom", 0.65),
    ("soar", 0.75),
    ("etf", 0.70),
    ("partnership", 0.50),
    ("launch", 0.45),
    ("upgrade", 0.50),
    ("halving", 0.60),
    ("accumulation", 0.55),
    ("whale", 0.40),
    ("staking", 0.35),
    ("integration", 0.45),
    ("mainnet", 0.55),
    ("listing", 0.50),
];

/// Blend weights: keywords carry half the signal, headlines outweigh bodies.
const KEYWORD_WEIGHT: f64 = 0.50;
const TITLE_WEIGHT: f64 = 0.30;
const BODY_WEIGHT: f64 = 0.20;

/// Sentiment scorer for news articles. VADER handles general language;
/// the keyword lexicons catch financial jargon it misses.
pub struct SentimentAnalyzer {
    analyzer: SentimentIntensityAnalyzer<'static>,
}

impl SentimentAnalyzer {
    pub fn new() -> Self {
        Self {
            analyzer: SentimentIntensityAnalyzer::new(),
        }
    }

    /// VADER compound polarity in [-1, 1]. Empty text is neutral.
    pub fn polarity(&self, text: &str) -> f64 {
        if text.trim().is_empty() {
            return 0.0;
        }
        let scores = self.analyzer.polarity_scores(text);
        scores.get("compound").copied().unwrap_or(0.0)
    }

    /// Average weight of matched lexicon entries, zero when nothing matches.
    pub fn keyword_score(&self, text: &str) -> f64 {
        let text_lower = text.to_lowercase();
        let mut sum = 0.0;
        let mut matches = 0usize;

        for (word, weight) in PANIC_WORDS.iter().chain(EUPHORIA_WORDS.iter()) {
            if text_lower.contains(word) {
                sum += weight;
                matches += 1;
            }
        }

        sum / matches.max(1) as f64
    }

    /// Score one article in [-1, 1]: 50% keyword average, 30% title
    /// polarity, 20% body polarity (body text includes the headline, which
    /// typically carries the signal).
    pub fn score_article(&self, title: &str, summary: &str) -> f64 {
        let keyword_avg = self.keyword_score(&format!("{title} {summary}"));
        let title_nlp = self.polarity(title);
        let body_nlp = self.polarity(&format!("{title} {summary}"));

        let combined =
            KEYWORD_WEIGHT * keyword_avg + TITLE_WEIGHT * title_nlp + BODY_WEIGHT * body_nlp;
        combined.clamp(-1.0, 1.0)
    }
}

impl Default for SentimentAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_headlines_score_negative() {
        let analyzer = SentimentAnalyzer::new();
        let headlines = [
            "Bitcoin crash deepens as exchange hack triggers mass liquidation",
            "SEC lawsuit sparks fear of broad crypto regulation",
            "Major lender bankrupt after collapse of token scam",
        ];
        for headline in headlines {
            let score = analyzer.score_article(headline, "");
            assert!(score < 0.0, "expected bearish score for '{headline}', got {score}");
        }
    }

    #[test]
    fn test_euphoria_headlines_score_positive() {
        let analyzer = SentimentAnalyzer::new();
        let headlines = [
            "Bitcoin surge continues toward all-time high on ETF approval",
            "Institutional adoption fuels crypto rally and breakout",
            "Mainnet launch and exchange listing drive accumulation",
        ];
        for headline in headlines {
            let score = analyzer.score_article(headline, "");
            assert!(score > 0.0, "expected bullish score for '{headline}', got {score}");
        }
    }

    #[test]
    fn test_empty_text_is_neutral() {
        let analyzer = SentimentAnalyzer::new();
        assert_eq!(analyzer.polarity(""), 0.0);
        assert_eq!(analyzer.polarity("   "), 0.0);
        assert_eq!(analyzer.keyword_score("nothing interesting here"), 0.0);
    }

    #[test]
    fn test_scores_are_clamped() {
        let analyzer = SentimentAnalyzer::new();
        let stacked = "crash hack exploit fraud collapse scam rug pull bankrupt";
        let score = analyzer.score_article(stacked, stacked);
        assert!((-1.0..=1.0).contains(&score));
        assert!(score < -0.3);
    }

    #[test]
    fn test_keyword_average_not_sum() {
        let analyzer = SentimentAnalyzer::new();
        // One strong word vs. the same word plus a mild one: the average
        // moves toward the mild weight instead of stacking.
        let single = analyzer.keyword_score("hack");
        let pair = analyzer.keyword_score("hack delay");
        assert!(pair > single);
    }
}
