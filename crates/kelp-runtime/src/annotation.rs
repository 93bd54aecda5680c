use std::{collections::BTreeMap, fmt::Display, rc::Rc};

pub type RcString = Rc<str>;

#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum AnnotationKey {
    /// Message recorded when the rule fails.
    Error,
    /// The rule is consumed and discarded.
    Void,
    /// The rule is consumed but produces no node of its own.
    Transient,
    /// Overrides the token the rule produces.
    Token,
    /// Forces a node even where it would otherwise be folded or omitted.
    Pinned,
    Custom(RcString),
}

impl AnnotationKey {
    pub fn from_label(label: &str) -> AnnotationKey {
        match label {
            "error" => AnnotationKey::Error,
            "void" => AnnotationKey::Void,
            "transient" => AnnotationKey::Transient,
            "token" => AnnotationKey::Token,
            "pinned" => AnnotationKey::Pinned,
            other => AnnotationKey::Custom(other.into()),
        }
    }
    /// Keys that only select the rule's behaviour and are not carried onto nodes.
    pub fn is_behaviour(&self) -> bool {
        matches!(
            self,
            AnnotationKey::Void | AnnotationKey::Transient | AnnotationKey::Token
        )
    }
    pub fn label(&self) -> &str {
        match self {
            AnnotationKey::Error => "error",
            AnnotationKey::Void => "void",
            AnnotationKey::Transient => "transient",
            AnnotationKey::Token => "token",
            AnnotationKey::Pinned => "pinned",
            AnnotationKey::Custom(label) => label,
        }
    }
}

#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum AnnotationValue {
    /// The annotation is present without a value.
    Set,
    Bool(bool),
    Int(i64),
    Str(RcString),
}

impl Display for AnnotationValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnnotationValue::Set => Ok(()),
            AnnotationValue::Bool(a) => write!(f, "({a})"),
            AnnotationValue::Int(a) => write!(f, "({a})"),
            AnnotationValue::Str(a) => write!(f, "({a:?})"),
        }
    }
}

#[derive(Clone, Default, PartialEq, Eq, Debug)]
pub struct Annotations(BTreeMap<AnnotationKey, AnnotationValue>);

impl Annotations {
    pub fn new() -> Annotations {
        Annotations::default()
    }
    pub fn with(mut self, key: AnnotationKey, value: AnnotationValue) -> Annotations {
        self.insert(key, value);
        self
    }
    pub fn insert(&mut self, key: AnnotationKey, value: AnnotationValue) -> Option<AnnotationValue> {
        self.0.insert(key, value)
    }
    pub fn get(&self, key: &AnnotationKey) -> Option<&AnnotationValue> {
        self.0.get(key)
    }
    pub fn contains(&self, key: &AnnotationKey) -> bool {
        self.0.contains_key(key)
    }
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
    pub fn len(&self) -> usize {
        self.0.len()
    }
    pub fn iter(&self) -> impl Iterator<Item = (&AnnotationKey, &AnnotationValue)> {
        self.0.iter()
    }

    /// Keys present on one side only are kept, `overrides` wins on conflicts.
    pub fn merge(&self, overrides: &Annotations) -> Annotations {
        let mut merged = self.clone();
        for (key, value) in overrides.iter() {
            merged.0.insert(key.clone(), value.clone());
        }
        merged
    }

    pub fn without_behaviour(&self) -> Annotations {
        Annotations(
            self.0
                .iter()
                .filter(|(key, _)| !key.is_behaviour())
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect(),
        )
    }

    pub fn error(&self) -> Option<&RcString> {
        self.str_value(&AnnotationKey::Error)
    }
    pub fn token(&self) -> Option<&RcString> {
        self.str_value(&AnnotationKey::Token)
    }
    pub fn is_pinned(&self) -> bool {
        self.flag(&AnnotationKey::Pinned)
    }
    pub fn is_void(&self) -> bool {
        self.flag(&AnnotationKey::Void)
    }
    pub fn is_transient(&self) -> bool {
        self.flag(&AnnotationKey::Transient)
    }

    fn str_value(&self, key: &AnnotationKey) -> Option<&RcString> {
        match self.0.get(key) {
            Some(AnnotationValue::Str(value)) => Some(value),
            _ => None,
        }
    }
    fn flag(&self, key: &AnnotationKey) -> bool {
        match self.0.get(key) {
            Some(AnnotationValue::Bool(value)) => *value,
            Some(_) => true,
            None => false,
        }
    }
}

impl Display for Annotations {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, (key, value)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "@{}{value}", key.label())?;
        }
        Ok(())
    }
}

#[test]
fn test_merge() {
    let base = Annotations::new()
        .with(AnnotationKey::Error, AnnotationValue::Str("base".into()))
        .with(AnnotationKey::Pinned, AnnotationValue::Set);
    let overrides = Annotations::new()
        .with(AnnotationKey::Error, AnnotationValue::Str("override".into()))
        .with(AnnotationKey::Custom("doc".into()), AnnotationValue::Int(3));

    let merged = base.merge(&overrides);
    assert_eq!(merged.len(), 3);
    assert_eq!(merged.error().map(|s| &**s), Some("override"));
    assert!(merged.is_pinned());
    assert_eq!(
        merged.to_string(),
        r#"@error("override") @pinned @doc(3)"#
    );

    let disabled = Annotations::new().with(AnnotationKey::Pinned, AnnotationValue::Bool(false));
    assert!(!disabled.is_pinned());
}

#[test]
fn test_without_behaviour() {
    let annotations = Annotations::new()
        .with(AnnotationKey::Token, AnnotationValue::Str("word".into()))
        .with(AnnotationKey::Void, AnnotationValue::Set)
        .with(AnnotationKey::Error, AnnotationValue::Str("expected word".into()))
        .with(AnnotationKey::Custom("doc".into()), AnnotationValue::Set);
    assert_eq!(
        annotations.without_behaviour().to_string(),
        r#"@error("expected word") @doc"#
    );
}
