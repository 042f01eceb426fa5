use crate::common::Value;
use crate::document::Document;

/// Collects the document keys referenced by `path` inside `document`.
///
/// The path is a dotted field path (`"customer.id"`). Arrays met along the
/// way are flattened, so `"lines.product"` yields the product key of every
/// order line. String values are returned verbatim and integral values in
/// their decimal form; anything else is ignored.
pub fn include_ids(document: &Document, path: &str) -> Vec<String> {
    let mut ids = Vec::new();
    let segments: Vec<&str> = path.split('.').filter(|s| !s.is_empty()).collect();
    if let Some((first, rest)) = segments.split_first() {
        if let Some(value) = document.get(first) {
            collect(value, rest, &mut ids);
        }
    }
    ids
}

fn collect(value: &Value, rest: &[&str], ids: &mut Vec<String>) {
    match value {
        Value::Array(items) => {
            for item in items {
                collect(item, rest, ids);
            }
        }
        Value::Document(doc) => {
            if let Some((first, tail)) = rest.split_first() {
                if let Some(nested) = doc.get(first) {
                    collect(nested, tail, ids);
                }
            }
        }
        scalar if rest.is_empty() => match scalar {
            Value::String(id) => ids.push(id.clone()),
            Value::I64(_) | Value::U64(_) => ids.push(scalar.to_compact_json()),
            _ => {}
        },
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc;

    #[test]
    fn test_top_level_reference() {
        let order = doc! { customer: "customers/1" };
        assert_eq!(include_ids(&order, "customer"), vec!["customers/1"]);
    }

    #[test]
    fn test_nested_path_through_array() {
        let order = doc! {
            lines: [
                { product: "products/1" },
                { product: "products/2" },
                { quantity: 3 }
            ]
        };
        assert_eq!(
            include_ids(&order, "lines.product"),
            vec!["products/1", "products/2"]
        );
    }

    #[test]
    fn test_array_of_keys() {
        let post = doc! { tags: ["tags/1", "tags/2"] };
        assert_eq!(include_ids(&post, "tags"), vec!["tags/1", "tags/2"]);
    }

    #[test]
    fn test_integral_and_missing_values() {
        let doc = doc! { ref_id: 42, flag: true, nested: { id: "x/1" } };
        assert_eq!(include_ids(&doc, "ref_id"), vec!["42"]);
        assert!(include_ids(&doc, "flag").is_empty());
        assert!(include_ids(&doc, "missing").is_empty());
        assert!(include_ids(&doc, "nested").is_empty());
        assert!(include_ids(&doc, "").is_empty());
    }
}
