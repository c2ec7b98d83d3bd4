//! Call arguments for natively implemented callables

use crate::error::{RunResult, RuntimeError};
use crate::value::Value;

/// Positional and keyword arguments, consumed as a native reads them
pub(crate) struct Args {
    func: String,
    positional: Vec<Option<Value>>,
    keywords: Vec<(String, Value)>,
}

impl Args {
    pub(crate) fn new(func: impl Into<String>, positional: Vec<Value>, keywords: Vec<(String, Value)>) -> Self {
        Self {
            func: func.into(),
            positional: positional.into_iter().map(Some).collect(),
            keywords,
        }
    }

    /// Same arguments with `receiver` as the first positional one
    pub(crate) fn prepend(mut self, func: &str, receiver: Value) -> Self {
        self.func = func.to_string();
        self.positional.insert(0, Some(receiver));
        self
    }

    /// Number of positional arguments passed
    pub(crate) fn len(&self) -> usize {
        self.positional.len()
    }

    /// Argument at `index` or under keyword `name`
    pub(crate) fn optional(&mut self, index: usize, name: &str) -> Option<Value> {
        if let Some(value) = self.positional.get_mut(index).and_then(Option::take) {
            return Some(value);
        }
        self.keyword(name)
    }

    pub(crate) fn required(&mut self, index: usize, name: &str) -> RunResult<Value> {
        self.optional(index, name).ok_or_else(|| {
            RuntimeError::type_error(format!("{}() missing required argument: '{name}'", self.func))
        })
    }

    /// Keyword-only argument
    pub(crate) fn keyword(&mut self, name: &str) -> Option<Value> {
        let index = self.keywords.iter().position(|(key, _)| key == name)?;
        Some(self.keywords.remove(index).1)
    }

    /// Next unread keyword argument, in call order
    pub(crate) fn take_keyword(&mut self) -> Option<(String, Value)> {
        if self.keywords.is_empty() {
            None
        } else {
            Some(self.keywords.remove(0))
        }
    }

    /// Every positional argument from `from` on
    pub(crate) fn rest(&mut self, from: usize) -> Vec<Value> {
        self.positional
            .iter_mut()
            .skip(from)
            .filter_map(Option::take)
            .collect()
    }

    /// Fail if anything was passed that the callable did not read
    pub(crate) fn finish(self) -> RunResult<()> {
        if let Some((key, _)) = self.keywords.first() {
            return Err(RuntimeError::type_error(format!(
                "{}() got an unexpected keyword argument '{key}'",
                self.func
            )));
        }
        let extra = self.positional.iter().filter(|v| v.is_some()).count();
        if extra > 0 {
            return Err(RuntimeError::type_error(format!(
                "{}() takes {} positional arguments but {} were given",
                self.func,
                self.positional.len() - extra,
                self.positional.len()
            )));
        }
        Ok(())
    }

    /// Drop unread keyword arguments such as `dtype=` that have no effect here
    pub(crate) fn ignore_rest(self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positional_then_keyword() {
        let mut args = Args::new(
            "f",
            vec![Value::int(1)],
            vec![("b".to_string(), Value::int(2))],
        );
        assert_eq!(args.required(0, "a").unwrap().as_i64(), Some(1));
        assert_eq!(args.optional(1, "b").unwrap().as_i64(), Some(2));
        assert!(args.optional(2, "c").is_none());
        assert!(args.finish().is_ok());
    }

    #[test]
    fn leftovers_are_errors() {
        let args = Args::new("f", Vec::new(), vec![("z".to_string(), Value::None)]);
        let err = args.finish().unwrap_err();
        assert!(err.to_string().contains("unexpected keyword argument 'z'"));

        let mut args = Args::new("g", vec![Value::int(1), Value::int(2)], Vec::new());
        let _ = args.required(0, "a");
        assert!(args.finish().is_err());
    }
}
