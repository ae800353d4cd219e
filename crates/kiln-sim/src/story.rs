//! A toy language model: a fixed word table with bigram logits.
//!
//! Enough to produce readable, reproducible stories of a bounded length so
//! the generation loop can be exercised end to end. A prompt is ingested as
//! is; only the words after it count toward the story length.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use kiln_core::GenerationParams;

const VOCAB: usize = 24;

const WORDS: [&str; VOCAB] = [
    "Once", "upon", "a", "time", "there", "was", "little", "girl", "named", "Lily", "she",
    "loved", "to", "play", "in", "the", "park", "with", "her", "dog", "one", "day", "sun", "happy",
];

/// Logit of `next` following `prev`. Favours the word after `prev` in the
/// table so greedy decoding reads like a sentence.
fn bigram_logit(prev: usize, next: usize) -> f32 {
    let dist = (next + VOCAB - prev) % VOCAB;
    if dist == 1 {
        4.0
    } else {
        ((prev * 31 + next * 17) % 13) as f32 / 6.0
    }
}

/// Pick the word after `prev`.
///
/// Temperature 0 takes the best-scoring word. Otherwise candidates are
/// weighted by `exp((logit - best) / temperature)`, the list is cut after the
/// best-ranked words whose share of the weight reaches `topp`, and one of
/// those is drawn in proportion to its weight.
fn next_word(prev: usize, params: &GenerationParams, rng: &mut StdRng) -> usize {
    let logits: [f32; VOCAB] = std::array::from_fn(|j| bigram_logit(prev, j));
    let mut ranked: [usize; VOCAB] = std::array::from_fn(|j| j);
    ranked.sort_by(|&a, &b| logits[b].total_cmp(&logits[a]));

    if params.temperature <= 0.0 {
        return ranked[0];
    }

    let best = logits[ranked[0]];
    let weights: [f32; VOCAB] = std::array::from_fn(|j| ((logits[j] - best) / params.temperature).exp());
    let total: f32 = weights.iter().sum();

    let mut nucleus = VOCAB;
    let mut mass = 0.0f32;
    for (rank, &word) in ranked.iter().enumerate() {
        mass += weights[word];
        if mass >= params.topp * total {
            nucleus = rank + 1;
            break;
        }
    }

    // the best word weighs exactly 1, so `mass` is never zero
    let mut draw = rng.gen_range(0.0..mass);
    for &word in &ranked[..nucleus] {
        if draw < weights[word] {
            return word;
        }
        draw -= weights[word];
    }
    ranked[nucleus - 1]
}

/// Generation context of one target.
pub struct Story {
    rng: StdRng,
    prev: usize,
    prompt_tokens: u32,
    produced: u32,
    limit: u32,
    text: String,
}

impl Story {
    /// Begin a story of at most `limit` generated tokens after `prompt`.
    /// Seed 0 lets the host pick.
    pub fn new(prompt: &str, seed: u64, limit: u32) -> Self {
        let seed = if seed == 0 { rand::random::<u64>() } else { seed };
        let words: Vec<&str> = prompt.split_whitespace().collect();
        // Continue from the last prompt word when the table knows it.
        let prev = words
            .last()
            .and_then(|last| WORDS.iter().position(|w| w.eq_ignore_ascii_case(last)))
            .unwrap_or(words.len() % VOCAB);
        Self {
            rng: StdRng::seed_from_u64(seed),
            prev,
            prompt_tokens: words.len() as u32,
            produced: 0,
            limit,
            text: words.join(" "),
        }
    }

    /// Tokens the prompt was ingested as.
    pub fn prompt_tokens(&self) -> u32 {
        self.prompt_tokens
    }

    /// Tokens generated after the prompt.
    pub fn produced(&self) -> u32 {
        self.produced
    }

    pub fn is_finished(&self) -> bool {
        self.produced >= self.limit
    }

    /// Prompt plus everything generated so far.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Produce up to `params.steps` tokens. Returns the count and the text.
    pub fn advance(&mut self, params: &GenerationParams) -> (u32, String) {
        let budget = params.steps.min(self.limit.saturating_sub(self.produced));
        let mut out = String::new();
        for _ in 0..budget {
            let next = next_word(self.prev, params, &mut self.rng);
            if !(self.text.is_empty() && out.is_empty()) {
                out.push(' ');
            }
            out.push_str(WORDS[next]);
            self.prev = next;
        }
        self.produced += budget;
        self.text.push_str(&out);
        (budget, out)
    }
}
