//! Field-pair driven comparison of current and desired records.
//!
//! A field that is absent on either side never counts as a difference, so a
//! user only changes what they declare. Lists compare as multisets unless a
//! pair says order matters; numbers compare by value regardless of whether
//! the controller sent them as strings.

use catalyst_core::Record;
use serde::Serialize;
use serde_json::Value;

/// How a field pair is compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compare {
    /// Structural equality with numeric coercion; lists as multisets.
    Exact,
    /// Like `Exact`, but strings ignore ASCII case.
    CaseInsensitive,
    /// Both sides coerced to numbers.
    Numeric,
    /// Lists compared as multisets.
    Multiset,
    /// Lists compared element by element, in order.
    Ordered,
    /// Lists of records matched by a natural key.
    ///
    /// Every desired element must exist in the current list and match it.
    /// Current elements missing from the desired list only count as a
    /// difference when `full_replace` is set. Without it the comparison is
    /// one-sided: a shorter desired list is not a request to delete.
    Keyed {
        /// Key field inside each element.
        key: &'static str,
        /// Treat the desired list as the complete set.
        full_replace: bool,
    },
}

/// One `(controller-field, desired-field)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldPair {
    /// Dotted path in the current record.
    pub controller: &'static str,
    /// Dotted path in the desired record.
    pub desired: &'static str,
    /// Comparison rule.
    pub compare: Compare,
}

impl FieldPair {
    /// A pair compared with [`Compare::Exact`].
    #[must_use]
    pub const fn new(controller: &'static str, desired: &'static str) -> Self {
        Self {
            controller,
            desired,
            compare: Compare::Exact,
        }
    }

    /// Override the comparison rule.
    #[must_use]
    pub const fn compare(mut self, compare: Compare) -> Self {
        self.compare = compare;
        self
    }

    /// Compare strings ignoring case.
    #[must_use]
    pub const fn case_insensitive(self) -> Self {
        self.compare(Compare::CaseInsensitive)
    }

    /// Compare as numbers.
    #[must_use]
    pub const fn numeric(self) -> Self {
        self.compare(Compare::Numeric)
    }

    /// Compare lists in order.
    #[must_use]
    pub const fn ordered(self) -> Self {
        self.compare(Compare::Ordered)
    }

    /// Compare lists of records by key.
    #[must_use]
    pub const fn keyed(self, key: &'static str, full_replace: bool) -> Self {
        self.compare(Compare::Keyed { key, full_replace })
    }
}

/// Result of a diff.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiffResult {
    /// True if any field differs.
    pub requires_update: bool,
    /// Desired-side names of the differing fields, in pair order.
    pub differing_fields: Vec<String>,
}

/// Compare `current` against `desired` over `pairs`.
///
/// Neither record is modified.
#[must_use]
pub fn diff(current: &Record, desired: &Record, pairs: &[FieldPair]) -> DiffResult {
    let differing_fields: Vec<String> = pairs
        .iter()
        .filter(|pair| {
            match (current.get(pair.controller), desired.get(pair.desired)) {
                (Some(have), Some(want)) => !values_match(have, want, pair.compare),
                _ => false,
            }
        })
        .map(|pair| pair.desired.to_string())
        .collect();

    DiffResult {
        requires_update: !differing_fields.is_empty(),
        differing_fields,
    }
}

/// Compare two values under a rule.
#[must_use]
pub fn values_match(have: &Value, want: &Value, compare: Compare) -> bool {
    match compare {
        Compare::Exact => loose_eq(have, want, false),
        Compare::CaseInsensitive => loose_eq(have, want, true),
        Compare::Numeric => match (as_number(have), as_number(want)) {
            (Some(a), Some(b)) => (a - b).abs() < f64::EPSILON,
            _ => loose_eq(have, want, false),
        },
        Compare::Multiset => match (have, want) {
            (Value::Array(a), Value::Array(b)) => multiset_eq(a, b, false),
            _ => loose_eq(have, want, false),
        },
        Compare::Ordered => match (have, want) {
            (Value::Array(a), Value::Array(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| loose_eq(x, y, false))
            }
            _ => loose_eq(have, want, false),
        },
        Compare::Keyed { key, full_replace } => match (have, want) {
            (Value::Array(a), Value::Array(b)) => keyed_eq(a, b, key, full_replace),
            _ => loose_eq(have, want, false),
        },
    }
}

fn loose_eq(a: &Value, b: &Value, ignore_case: bool) -> bool {
    match (a, b) {
        (Value::String(x), Value::String(y)) => {
            if ignore_case {
                x.eq_ignore_ascii_case(y)
            } else {
                x == y
            }
        }
        (Value::Number(_), _) | (_, Value::Number(_)) => {
            match (as_number(a), as_number(b)) {
                (Some(x), Some(y)) => (x - y).abs() < f64::EPSILON,
                _ => false,
            }
        }
        (Value::Array(x), Value::Array(y)) => multiset_eq(x, y, ignore_case),
        (Value::Object(x), Value::Object(y)) => x.iter().all(|(key, xv)| match y.get(key) {
            Some(yv) if !xv.is_null() && !yv.is_null() => loose_eq(xv, yv, ignore_case),
            _ => true,
        }),
        _ => a == b,
    }
}

fn multiset_eq(a: &[Value], b: &[Value], ignore_case: bool) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut unmatched: Vec<&Value> = b.iter().collect();
    a.iter().all(|x| {
        match unmatched.iter().position(|y| loose_eq(x, y, ignore_case)) {
            Some(i) => {
                unmatched.swap_remove(i);
                true
            }
            None => false,
        }
    })
}

fn keyed_eq(have: &[Value], want: &[Value], key: &str, full_replace: bool) -> bool {
    if full_replace {
        have.len() == want.len() && keyed_covers(have, want, key) && keyed_covers(want, have, key)
    } else {
        keyed_covers(have, want, key)
    }
}

/// Every element of `want` has a matching element in `have`.
fn keyed_covers(have: &[Value], want: &[Value], key: &str) -> bool {
    let key_of = |v: &Value| v.get(key).filter(|k| !k.is_null()).cloned();

    want.iter().all(|w| {
        let Some(k) = key_of(w) else {
            return have.iter().any(|h| loose_eq(h, w, false));
        };
        have.iter()
            .find(|h| key_of(h).is_some_and(|hk| loose_eq(&hk, &k, false)))
            .is_some_and(|h| loose_eq(h, w, false))
    })
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rec(value: Value) -> Record {
        Record::try_from(value).unwrap()
    }

    const SSID_PAIRS: &[FieldPair] = &[
        FieldPair::new("ssid", "ssid"),
        FieldPair::new("authType", "authType").case_insensitive(),
        FieldPair::new("sessionTimeOut", "sessionTimeOut").numeric(),
        FieldPair::new("authServers", "authServers"),
    ];

    #[test]
    fn absent_fields_are_equal() {
        let current = rec(json!({"ssid": "Corp", "authType": "WPA2_PERSONAL"}));
        let desired = rec(json!({"ssid": "Corp", "sessionTimeOut": 1800}));
        assert!(!diff(&current, &desired, SSID_PAIRS).requires_update);
    }

    #[test]
    fn reports_differing_fields_in_pair_order() {
        let current = rec(json!({"ssid": "Corp", "authType": "OPEN", "sessionTimeOut": "1800"}));
        let desired = rec(json!({"ssid": "corp", "authType": "open", "sessionTimeOut": 1800}));
        let result = diff(&current, &desired, SSID_PAIRS);
        assert!(result.requires_update);
        assert_eq!(result.differing_fields, ["ssid"]);
    }

    #[test]
    fn lists_default_to_multisets() {
        let current = rec(json!({"authServers": ["10.0.0.1", "10.0.0.2"]}));
        let desired = rec(json!({"authServers": ["10.0.0.2", "10.0.0.1"]}));
        assert!(!diff(&current, &desired, SSID_PAIRS).requires_update);

        let desired = rec(json!({"authServers": ["10.0.0.2"]}));
        assert!(diff(&current, &desired, SSID_PAIRS).requires_update);
    }

    #[test]
    fn ordered_lists_respect_order() {
        let pairs = [FieldPair::new("slots", "slots").ordered()];
        let current = rec(json!({"slots": [0, 1]}));
        let desired = rec(json!({"slots": [1, 0]}));
        assert!(diff(&current, &desired, &pairs).requires_update);
    }

    #[test]
    fn keyed_lists() {
        let partial = [FieldPair::new("rules", "rules").keyed("mnemonic", false)];
        let full = [FieldPair::new("rules", "rules").keyed("mnemonic", true)];
        let current = rec(json!({"rules": [
            {"mnemonic": "A", "occurrences": 1, "severity": 3},
            {"mnemonic": "B", "occurrences": 2}
        ]}));

        let desired = rec(json!({"rules": [{"mnemonic": "A", "occurrences": 1}]}));
        assert!(!diff(&current, &desired, &partial).requires_update);
        assert!(diff(&current, &desired, &full).requires_update);

        let desired = rec(json!({"rules": [{"mnemonic": "A", "occurrences": 5}]}));
        assert!(diff(&current, &desired, &partial).requires_update);

        let desired = rec(json!({"rules": [{"mnemonic": "C"}]}));
        assert!(diff(&current, &desired, &partial).requires_update);
    }

    #[test]
    fn nested_paths() {
        let pairs = [FieldPair::new(
            "ipTransitSettings.autonomousSystemNumber",
            "ip_transit_settings.autonomous_system_number",
        )
        .numeric()];
        let current = rec(json!({"ipTransitSettings": {"autonomousSystemNumber": "65001"}}));
        let desired = rec(json!({"ip_transit_settings": {"autonomous_system_number": 65001}}));
        assert!(!diff(&current, &desired, &pairs).requires_update);
    }

    #[test]
    fn diff_is_symmetric() {
        let pairs = [
            SSID_PAIRS[0],
            SSID_PAIRS[1],
            SSID_PAIRS[2],
            SSID_PAIRS[3],
            FieldPair::new("rules", "rules").keyed("mnemonic", true),
            FieldPair::new("slots", "slots").ordered(),
        ];
        let samples = [
            json!({}),
            json!({"ssid": "Corp"}),
            json!({"ssid": "Guest", "authType": "OPEN"}),
            json!({"authType": "open", "sessionTimeOut": 60}),
            json!({"sessionTimeOut": "60", "authServers": ["a", "b"]}),
            json!({"authServers": ["b", "a"]}),
            json!({"authServers": ["a"], "ssid": null}),
            json!({"rules": [{"mnemonic": "A", "occurrences": 1}, {"mnemonic": "B"}]}),
            json!({"rules": [{"mnemonic": "B", "severity": 2}, {"mnemonic": "A"}]}),
            json!({"rules": [{"mnemonic": "A", "occurrences": 3}]}),
            json!({"rules": [{"pattern": "x"}]}),
            json!({"rules": [], "slots": [1, 0]}),
            json!({"slots": [0, 1]}),
        ];
        for a in &samples {
            for b in &samples {
                let (a, b) = (rec(a.clone()), rec(b.clone()));
                assert_eq!(
                    diff(&a, &b, &pairs).requires_update,
                    diff(&b, &a, &pairs).requires_update,
                    "asymmetric for {a:?} / {b:?}"
                );
            }
        }
    }

    #[test]
    fn partial_keyed_lists_are_one_sided() {
        let pairs = [FieldPair::new("rules", "rules").keyed("mnemonic", false)];
        let two = rec(json!({"rules": [{"mnemonic": "A"}, {"mnemonic": "B"}]}));
        let one = rec(json!({"rules": [{"mnemonic": "A"}]}));
        assert!(!diff(&two, &one, &pairs).requires_update);
        assert!(diff(&one, &two, &pairs).requires_update);
    }
}
