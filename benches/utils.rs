use escapade::{DataModel, Value as TemplateValue};
use rand::{Rng, SeedableRng, rngs::StdRng};
use serde_json::{Value, json};

/// Generate n random data models, as JSON, to use in the benchmark
pub fn generate_random_contexts(n: usize) -> Vec<Value> {
    let mut rng = StdRng::seed_from_u64(42); // Fixed seed for reproducibility
    let mut contexts = Vec::with_capacity(n);

    for _ in 0..n {
        let name = random_string(&mut rng, 5, 10);
        let tier = rng.random_range(1..5);

        let items_count = rng.random_range(3..10);
        let mut items = Vec::with_capacity(items_count);
        for _ in 0..items_count {
            items.push(json!({
                "name": random_string(&mut rng, 3, 8),
                "price": rng.random_range(10.0..1000.0),
            }));
        }
        let names: Vec<Value> = items.iter().map(|item| item["name"].clone()).collect();
        let prices: Vec<Value> = items.iter().map(|item| item["price"].clone()).collect();

        contexts.push(json!({
            "name": name,
            "tier": tier,
            "names": names,
            "prices": prices,
            "note": if rng.random_bool(0.5) { "<b>fragile</b> & heavy" } else { "" },
        }));
    }

    contexts
}

/// Converts a JSON object into a data model. Objects nested deeper than the
/// top level aren't used by the benchmark template and are skipped.
pub fn to_data_model(json: &Value) -> DataModel {
    let mut model = DataModel::new();
    if let Value::Object(map) = json {
        for (key, value) in map {
            if let Some(value) = to_template_value(value) {
                model.insert(key, value);
            }
        }
    }
    model
}

fn to_template_value(json: &Value) -> Option<TemplateValue> {
    match json {
        Value::String(s) => Some(TemplateValue::from(s.as_str())),
        Value::Bool(b) => Some(TemplateValue::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Some(TemplateValue::from(i)),
            None => n.as_f64().map(TemplateValue::from),
        },
        Value::Array(items) => Some(TemplateValue::Sequence(
            items.iter().filter_map(to_template_value).collect(),
        )),
        Value::Null | Value::Object(_) => None,
    }
}

/// Generate a random string with length between min and max
fn random_string(rng: &mut StdRng, min_len: usize, max_len: usize) -> String {
    let charset = b"abcdefghijklmnopqrstuvwxyz";
    let len = rng.random_range(min_len..=max_len);

    (0..len)
        .map(|_| char::from(charset[rng.random_range(0..charset.len())]))
        .collect()
}
