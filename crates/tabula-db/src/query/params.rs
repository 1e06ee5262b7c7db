//! Parameter accumulation during compilation.

use std::collections::BTreeMap;

use crate::value::Value;

use super::statement::ParamStyle;

/// Collects statement parameters in the order the compiler visits them.
///
/// In positional mode every value becomes a `?` placeholder. In named mode
/// values are named `<prefix>param<n>`; each subquery compiled at this
/// level gets a child manager whose prefix is `<prefix>sq<k>_`, where `k`
/// counts the subqueries this manager has handed out. Names from distinct
/// AST nodes therefore never collide, however deep or wide the nesting.
#[derive(Debug, Clone)]
pub struct ParamManager {
    style: ParamStyle,
    prefix: String,
    positional: Vec<Value>,
    named: BTreeMap<String, Value>,
    types: BTreeMap<String, String>,
    next_param: usize,
    next_subquery: usize,
}

impl ParamManager {
    pub fn new(style: ParamStyle) -> Self {
        Self::with_prefix(style, String::new())
    }

    fn with_prefix(style: ParamStyle, prefix: String) -> Self {
        Self {
            style,
            prefix,
            positional: Vec::new(),
            named: BTreeMap::new(),
            types: BTreeMap::new(),
            next_param: 0,
            next_subquery: 0,
        }
    }

    pub const fn style(&self) -> ParamStyle {
        self.style
    }

    /// Records a value and returns the placeholder to splice into the SQL.
    pub fn add(&mut self, value: Value, sql_type: String) -> String {
        match self.style {
            ParamStyle::Positional => {
                self.types
                    .insert(self.positional.len().to_string(), sql_type);
                self.positional.push(value);
                "?".to_string()
            }
            ParamStyle::Named => {
                let name = format!("{}param{}", self.prefix, self.next_param);
                self.next_param += 1;
                self.named.insert(name.clone(), value);
                self.types.insert(name.clone(), sql_type);
                format!("@{name}")
            }
        }
    }

    /// Opens a child manager for the next subquery at this level.
    pub fn subquery(&mut self) -> Self {
        let prefix = format!("{}sq{}_", self.prefix, self.next_subquery);
        self.next_subquery += 1;
        Self::with_prefix(self.style, prefix)
    }

    /// Folds a finished child manager back into this one.
    pub fn merge(&mut self, child: Self) {
        let offset = self.positional.len();
        match self.style {
            ParamStyle::Positional => {
                for (index, sql_type) in child.types {
                    if let Ok(index) = index.parse::<usize>() {
                        self.types.insert((offset + index).to_string(), sql_type);
                    }
                }
                self.positional.extend(child.positional);
            }
            ParamStyle::Named => {
                self.named.extend(child.named);
                self.types.extend(child.types);
            }
        }
    }

    /// Number of parameters collected so far.
    pub fn len(&self) -> usize {
        match self.style {
            ParamStyle::Positional => self.positional.len(),
            ParamStyle::Named => self.named.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Consumes the manager, returning `(positional, named, types)`.
    pub fn into_parts(
        self,
    ) -> (
        Vec<Value>,
        BTreeMap<String, Value>,
        BTreeMap<String, String>,
    ) {
        (self.positional, self.named, self.types)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positional_placeholders() {
        let mut params = ParamManager::new(ParamStyle::Positional);
        assert_eq!(params.add(Value::Int(1), "INT64".into()), "?");
        assert_eq!(params.add(Value::Int(2), "INT64".into()), "?");
        let (positional, named, types) = params.into_parts();
        assert_eq!(positional, vec![Value::Int(1), Value::Int(2)]);
        assert!(named.is_empty());
        assert_eq!(types.get("1").map(String::as_str), Some("INT64"));
    }

    #[test]
    fn test_named_placeholders() {
        let mut params = ParamManager::new(ParamStyle::Named);
        assert_eq!(params.add(Value::Int(1), "INT64".into()), "@param0");
        assert_eq!(params.add(Value::Int(2), "INT64".into()), "@param1");
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn test_subquery_prefixes_are_unique() {
        let mut params = ParamManager::new(ParamStyle::Named);
        let mut first = params.subquery();
        let mut nested = first.subquery();
        let mut second = params.subquery();

        assert_eq!(first.add(Value::Int(1), "INT64".into()), "@sq0_param0");
        assert_eq!(nested.add(Value::Int(2), "INT64".into()), "@sq0_sq0_param0");
        assert_eq!(second.add(Value::Int(3), "INT64".into()), "@sq1_param0");

        first.merge(nested);
        params.merge(first);
        params.merge(second);
        let (_, named, _) = params.into_parts();
        assert_eq!(named.len(), 3);
    }

    #[test]
    fn test_positional_merge_offsets_types() {
        let mut params = ParamManager::new(ParamStyle::Positional);
        params.add(Value::Int(1), "INT64".into());
        let mut child = params.subquery();
        child.add(Value::from("x"), "STRING".into());
        params.merge(child);
        let (positional, _, types) = params.into_parts();
        assert_eq!(positional.len(), 2);
        assert_eq!(types.get("1").map(String::as_str), Some("STRING"));
    }
}
