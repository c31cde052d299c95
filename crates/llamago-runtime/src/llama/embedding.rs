//! Post-processing of raw embedding vectors: normalization, similarity and
//! the output formats of the `embedding` command.

use std::fmt::Write as _;

use serde_json::{Value, json};

use llamago_core::EmbeddingFormat;

/// Scale `v` according to `mode`.
///
/// * `-1` leaves the vector untouched
/// * `0` scales the largest absolute component to the int16 range
/// * `2` is the euclidean norm
/// * any other value is a p-norm (`1` is taxicab)
///
/// A zero vector stays zero.
pub fn normalize(v: &[f32], mode: i32) -> Vec<f32> {
    let sum: f64 = match mode {
        -1 => 1.0,
        0 => v.iter().fold(0.0_f64, |m, x| m.max(f64::from(x.abs()))) / 32760.0,
        2 => v.iter().map(|x| f64::from(*x).powi(2)).sum::<f64>().sqrt(),
        p => {
            let p = f64::from(p);
            v.iter()
                .map(|x| f64::from(x.abs()).powf(p))
                .sum::<f64>()
                .powf(1.0 / p)
        }
    };

    let factor = if sum > 0.0 { 1.0 / sum } else { 0.0 };
    #[allow(clippy::cast_possible_truncation)]
    let scaled: Vec<f32> = v.iter().map(|x| (f64::from(*x) * factor) as f32).collect();
    scaled
}

/// Cosine similarity of two vectors of equal length.
///
/// Two zero vectors are identical (1.0); one zero vector is unrelated (0.0).
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let (mut dot, mut norm_a, mut norm_b) = (0.0_f64, 0.0_f64, 0.0_f64);
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return if norm_a == 0.0 && norm_b == 0.0 { 1.0 } else { 0.0 };
    }
    #[allow(clippy::cast_possible_truncation)]
    let sim = (dot / (norm_a.sqrt() * norm_b.sqrt())) as f32;
    sim
}

/// Pairwise cosine similarity, row `i` column `j`.
pub fn similarity_matrix(vectors: &[Vec<f32>]) -> Vec<Vec<f32>> {
    vectors
        .iter()
        .map(|a| vectors.iter().map(|b| cosine_similarity(a, b)).collect())
        .collect()
}

/// Render normalized vectors in the requested output format.
///
/// `prompts` labels the rows of the similarity matrix in text output.
pub fn render(
    vectors: &[Vec<f32>],
    prompts: &[String],
    format: EmbeddingFormat,
    normalize_mode: i32,
) -> Result<String, serde_json::Error> {
    match format {
        EmbeddingFormat::Array => serde_json::to_string(vectors),
        EmbeddingFormat::Json => serde_json::to_string_pretty(&json_list(vectors, false)),
        EmbeddingFormat::JsonPlus => serde_json::to_string_pretty(&json_list(vectors, true)),
        EmbeddingFormat::Text => Ok(render_text(vectors, prompts, normalize_mode)),
    }
}

fn json_list(vectors: &[Vec<f32>], with_similarity: bool) -> Value {
    let data: Vec<Value> = vectors
        .iter()
        .enumerate()
        .map(|(index, embedding)| {
            json!({
                "object": "embedding",
                "index": index,
                "embedding": embedding,
            })
        })
        .collect();

    let mut list = json!({ "object": "list", "data": data });
    if with_similarity && vectors.len() > 1 {
        list["cosineSimilarity"] = json!(similarity_matrix(vectors));
    }
    list
}

fn render_text(vectors: &[Vec<f32>], prompts: &[String], normalize_mode: i32) -> String {
    let value = |x: f32| {
        if normalize_mode == 0 {
            format!("{x:6.0} ")
        } else {
            format!("{x:9.6} ")
        }
    };

    let mut out = String::new();
    for (i, v) in vectors.iter().enumerate() {
        let _ = write!(out, "embedding {i}: ");
        if v.len() <= 6 {
            v.iter().for_each(|x| out.push_str(&value(*x)));
        } else {
            v[..3].iter().for_each(|x| out.push_str(&value(*x)));
            out.push_str(" ... ");
            v[v.len() - 3..].iter().for_each(|x| out.push_str(&value(*x)));
        }
        out.push('\n');
    }

    if vectors.len() > 1 {
        out.push_str("\ncosine similarity matrix:\n\n");
        for prompt in prompts.iter().take(vectors.len()) {
            let label: String = prompt.chars().take(6).collect();
            let _ = write!(out, "{label:>6} ");
        }
        out.push('\n');
        for (i, row) in similarity_matrix(vectors).iter().enumerate() {
            for sim in row {
                let _ = write!(out, "{sim:6.2} ");
            }
            let label: String = prompts
                .get(i)
                .map(|p| p.chars().take(10).collect())
                .unwrap_or_default();
            let _ = writeln!(out, "{label}");
        }
    }
    out
}
