use serde_json::Value;

use crate::normalize::normalize;
use crate::snapshot::RulesCacheSnapshot;

/// Sentinel returned when the buyer organism is on the unwanted list. Kept
/// verbatim through every downstream sum so rejection always dominates.
pub const REJECTED_SCORE: i64 = -9999;

/// Fixed business rule: any tender in its second call gets a flat bonus.
pub const SECOND_CALL_BONUS: i64 = 20;

/// A score plus the human-readable trail of rules that produced it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScoreResult {
    pub score: i64,
    pub trace: Vec<String>,
}

/// Fields available straight off the listing, before any detail fetch.
pub struct Phase1Input<'a> {
    pub name: &'a str,
    pub state_text: &'a str,
    pub organism_name: &'a str,
}

/// Scores what's knowable from the listing alone: organism rules, the
/// second-call bonus, and title-weighted keywords. Everything is clamped to
/// zero at the end, except the unwanted-organism sentinel, which is returned
/// immediately and bypasses the clamp.
pub fn score_phase1(snapshot: &RulesCacheSnapshot, input: &Phase1Input) -> ScoreResult {
    let normalized_name = normalize(input.name);
    let normalized_state = normalize(input.state_text);

    let mut sum: i64 = 0;
    let mut trace = Vec::new();

    if let Some(organism_id) = snapshot.resolve_organism(input.organism_name) {
        if snapshot.organism_unwanted.contains(&organism_id) {
            return ScoreResult {
                score: REJECTED_SCORE,
                trace: vec!["Organism rejected".to_string()],
            };
        }
        if let Some(points) = snapshot.organism_priority.get(&organism_id) {
            sum += points;
            trace.push(format!("Organism priority: +{}", points));
        }
    }

    if normalized_state.contains("segundo llamado") {
        sum += SECOND_CALL_BONUS;
        trace.push(format!("Second call: +{}", SECOND_CALL_BONUS));
    }

    for keyword in &snapshot.keywords {
        if keyword.title_weight != 0 && normalized_name.contains(keyword.normalized_text.as_str()) {
            sum += keyword.title_weight;
            trace.push(format!(
                "Keyword '{}' in title: +{}",
                keyword.normalized_text, keyword.title_weight
            ));
        }
    }

    ScoreResult {
        score: sum.max(0),
        trace,
    }
}

/// Scores what's knowable after a detail fetch: description and product
/// list. Never clamped to zero and never rejects — phase 1 already decided
/// rejection.
pub fn score_phase2(
    snapshot: &RulesCacheSnapshot,
    description: Option<&str>,
    products: Option<&Value>,
) -> ScoreResult {
    let normalized_description = description.map(normalize).unwrap_or_default();
    let flattened_products = products.map(flatten_products).unwrap_or_default();
    let normalized_products = normalize(&flattened_products);

    let mut sum: i64 = 0;
    let mut trace = Vec::new();

    for keyword in &snapshot.keywords {
        if keyword.description_weight != 0
            && normalized_description.contains(keyword.normalized_text.as_str())
        {
            sum += keyword.description_weight;
            trace.push(format!(
                "Keyword '{}' in description: +{}",
                keyword.normalized_text, keyword.description_weight
            ));
        }
        if keyword.products_weight != 0
            && normalized_products.contains(keyword.normalized_text.as_str())
        {
            sum += keyword.products_weight;
            trace.push(format!(
                "Keyword '{}' in products: +{}",
                keyword.normalized_text, keyword.products_weight
            ));
        }
    }

    ScoreResult { score: sum, trace }
}

/// Flattens a product list to "name description" pairs joined by " | " for
/// substring search. Accepts either a JSON array of product objects or a
/// JSON-encoded string of the same, decoding defensively either way.
fn flatten_products(products: &Value) -> String {
    let items: Vec<Value> = match products {
        Value::Array(arr) => arr.clone(),
        Value::String(s) => serde_json::from_str::<Vec<Value>>(s).unwrap_or_default(),
        _ => Vec::new(),
    };

    items
        .iter()
        .map(|item| {
            let name = item.get("name").and_then(Value::as_str).unwrap_or("");
            let description = item.get("description").and_then(Value::as_str).unwrap_or("");
            format!("{} {}", name, description).trim().to_string()
        })
        .collect::<Vec<_>>()
        .join(" | ")
}

/// Combines the two phases into the final score and trace. Total trace
/// preserves phase order: phase1 entries first, then phase2.
pub fn combine(phase1: ScoreResult, phase2: ScoreResult) -> ScoreResult {
    if phase1.score == REJECTED_SCORE {
        return phase1;
    }
    let mut trace = phase1.trace;
    trace.extend(phase2.trace);
    ScoreResult {
        score: phase1.score + phase2.score,
        trace,
    }
}
