use serde_yaml::Value;

/// Deep-merge `overlay` on top of `base`.
/// If both sides have a Mapping for the same key, recurse.
/// Otherwise `overlay`'s value wins; sequences are replaced wholesale,
/// never merged element-wise.
///
/// Existing keys keep their position in `base`; keys new in `overlay` are
/// appended in `overlay` order.
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Mapping(mut merged), Value::Mapping(overlay_map)) => {
            for (key, overlay_val) in overlay_map {
                // Take the current value out of the slot so both sides can be
                // moved into the recursion.
                let slot = merged.entry(key).or_insert(Value::Null);
                let base_val = std::mem::replace(slot, Value::Null);
                *slot = deep_merge(base_val, overlay_val);
            }
            Value::Mapping(merged)
        }
        (_, overlay) => overlay,
    }
}
