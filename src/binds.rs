use crate::types::RowValues;

/// An ordered set of named bind parameters for one statement.
///
/// Keys are unique within a set; insertion order is preserved because the
/// driver boundary binds positionally in that order. The IN-clause helper
/// appends numerically named keys, so the same `BindSet` must be used for
/// every placeholder-generating call within one statement:
/// ```rust
/// use sql_conduit::BindSet;
///
/// let mut binds = BindSet::new();
/// let a = binds.in_clause(vec!["name 2".into(), "name 5".into()]);
/// let b = binds.in_clause(vec!["name 8".into(), "name 9".into()]);
/// let sql = format!("SELECT * FROM test WHERE name IN ({a}) OR name IN ({b})");
/// # let _ = sql;
/// ```
#[derive(Debug, Clone, Default)]
pub struct BindSet {
    entries: Vec<(String, RowValues)>,
}

impl BindSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a bind set from `(name, value)` pairs.
    #[must_use]
    pub fn from_pairs<N, V>(pairs: impl IntoIterator<Item = (N, V)>) -> Self
    where
        N: Into<String>,
        V: Into<RowValues>,
    {
        let mut set = Self::new();
        for (name, value) in pairs {
            set.insert(name, value);
        }
        set
    }

    /// Insert or replace a named parameter, preserving insertion order for
    /// new keys.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<RowValues>) -> &mut Self {
        let name = name.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
        self
    }

    /// Chained-construction variant of [`insert`](Self::insert).
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<RowValues>) -> Self {
        self.insert(name, value);
        self
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&RowValues> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate parameters in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &RowValues)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// Append positionally named parameters for an `IN (...)` clause and
    /// return the placeholder list to splice into the SQL text.
    ///
    /// With `n` existing parameters and `k` new values, this creates keys
    /// `n..n+k` and returns `"@n,@n+1,…,@n+k-1"`. Parameter-count limits are
    /// not enforced here; an oversized set surfaces as a driver error.
    pub fn in_clause(&mut self, values: impl IntoIterator<Item = RowValues>) -> String {
        let start = self.entries.len();
        let mut placeholders = Vec::new();
        for (i, value) in values.into_iter().enumerate() {
            let key = (start + i).to_string();
            self.entries.push((key, value));
            placeholders.push(format!("@{}", start + i));
        }
        placeholders.join(",")
    }
}

impl<N, V> FromIterator<(N, V)> for BindSet
where
    N: Into<String>,
    V: Into<RowValues>,
{
    fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
        Self::from_pairs(iter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_clause_numbers_from_existing_len() {
        let mut binds = BindSet::new().with("name", "name 3");
        let placeholders =
            binds.in_clause(vec!["a".into(), "b".into(), "c".into()]);
        assert_eq!(placeholders, "@1,@2,@3");
        assert_eq!(binds.len(), 4);
        assert_eq!(binds.get("1").and_then(|v| v.as_text()), Some("a"));
        assert_eq!(binds.get("3").and_then(|v| v.as_text()), Some("c"));
    }

    #[test]
    fn in_clause_twice_does_not_collide() {
        let mut binds = BindSet::new();
        let first = binds.in_clause(vec!["name 2".into(), "name 5".into()]);
        let second = binds.in_clause(vec!["name 8".into(), "name 9".into()]);
        assert_eq!(first, "@0,@1");
        assert_eq!(second, "@2,@3");
        assert_eq!(binds.len(), 4);
    }

    #[test]
    fn in_clause_with_no_values_is_empty() {
        let mut binds = BindSet::new();
        assert_eq!(binds.in_clause(Vec::new()), "");
        assert!(binds.is_empty());
    }

    #[test]
    fn insert_replaces_existing_key_in_place() {
        let mut binds = BindSet::new().with("a", 1i64).with("b", 2i64);
        binds.insert("a", 9i64);
        assert_eq!(binds.len(), 2);
        assert_eq!(binds.get("a").and_then(|v| v.as_int()), Some(&9));
        // order unchanged
        let names: Vec<_> = binds.iter().map(|(n, _)| n.to_string()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }
}
