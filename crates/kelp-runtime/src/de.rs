//! Decoding of homogeneous trees into `serde::Deserialize` types.
//!
//! Struct fields are looked up among the children by token name, a field with several matching
//! children decodes as a sequence. Scalars are parsed from the matched text.

use std::{fmt::Display, str::FromStr};

use serde::de::{
    self, value::BorrowedStrDeserializer, DeserializeSeed, Deserializer, EnumAccess,
    IntoDeserializer, MapAccess, SeqAccess, VariantAccess, Visitor,
};

use crate::{grammar::Grammar, node::Node};

#[derive(thiserror::Error, Clone, PartialEq, Eq, Debug)]
pub enum DecodeError {
    #[error("{0}")]
    Custom(String),
    #[error("Cannot decode {text:?} as {expected}")]
    InvalidScalar { text: String, expected: &'static str },
    #[error("Node `{name}` does not name any variant of {expected:?}")]
    UnknownVariant {
        name: String,
        expected: &'static [&'static str],
    },
}

impl de::Error for DecodeError {
    fn custom<T: Display>(msg: T) -> Self {
        DecodeError::Custom(msg.to_string())
    }
}

pub fn from_node<'de, T>(node: &'de Node, source: &'de str, grammar: &'de Grammar) -> Result<T, DecodeError>
where
    T: de::Deserialize<'de>,
{
    T::deserialize(NodeDeserializer {
        node,
        source,
        grammar,
    })
}

#[derive(Clone, Copy)]
struct NodeDeserializer<'de> {
    node: &'de Node,
    source: &'de str,
    grammar: &'de Grammar,
}

impl<'de> NodeDeserializer<'de> {
    fn with(self, node: &'de Node) -> NodeDeserializer<'de> {
        NodeDeserializer { node, ..self }
    }
    fn text(&self) -> &'de str {
        self.node.matched(self.source)
    }
    fn name(&self) -> &'de str {
        self.node.name(self.grammar)
    }
    fn parse<T: FromStr>(&self, expected: &'static str) -> Result<T, DecodeError> {
        let text = self.text();
        text.trim().parse().map_err(|_| DecodeError::InvalidScalar {
            text: text.to_owned(),
            expected,
        })
    }
}

macro_rules! deserialize_parsed {
    ($($method:ident => $visit:ident($ty:ty)),* $(,)?) => {
        $(
            fn $method<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DecodeError> {
                visitor.$visit(self.parse::<$ty>(stringify!($ty))?)
            }
        )*
    };
}

impl<'de> Deserializer<'de> for NodeDeserializer<'de> {
    type Error = DecodeError;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DecodeError> {
        match self.node.is_leaf() {
            true => visitor.visit_borrowed_str(self.text()),
            false => self.deserialize_map(visitor),
        }
    }

    deserialize_parsed! {
        deserialize_bool => visit_bool(bool),
        deserialize_i8 => visit_i8(i8),
        deserialize_i16 => visit_i16(i16),
        deserialize_i32 => visit_i32(i32),
        deserialize_i64 => visit_i64(i64),
        deserialize_u8 => visit_u8(u8),
        deserialize_u16 => visit_u16(u16),
        deserialize_u32 => visit_u32(u32),
        deserialize_u64 => visit_u64(u64),
        deserialize_f32 => visit_f32(f32),
        deserialize_f64 => visit_f64(f64),
        deserialize_char => visit_char(char),
    }

    fn deserialize_str<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DecodeError> {
        visitor.visit_borrowed_str(self.text())
    }
    fn deserialize_string<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DecodeError> {
        self.deserialize_str(visitor)
    }
    fn deserialize_bytes<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DecodeError> {
        visitor.visit_borrowed_bytes(self.text().as_bytes())
    }
    fn deserialize_byte_buf<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DecodeError> {
        self.deserialize_bytes(visitor)
    }
    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DecodeError> {
        visitor.visit_some(self)
    }
    fn deserialize_unit<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DecodeError> {
        visitor.visit_unit()
    }
    fn deserialize_unit_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, DecodeError> {
        visitor.visit_unit()
    }
    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, DecodeError> {
        visitor.visit_newtype_struct(self)
    }
    fn deserialize_seq<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DecodeError> {
        visitor.visit_seq(NodeSeq {
            de: self,
            nodes: self.node.children().iter(),
        })
    }
    fn deserialize_tuple<V: Visitor<'de>>(self, _len: usize, visitor: V) -> Result<V::Value, DecodeError> {
        self.deserialize_seq(visitor)
    }
    fn deserialize_tuple_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _len: usize,
        visitor: V,
    ) -> Result<V::Value, DecodeError> {
        self.deserialize_seq(visitor)
    }
    fn deserialize_map<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DecodeError> {
        visitor.visit_map(ChildMap {
            de: self,
            children: self.node.children().iter(),
            value: None,
        })
    }
    fn deserialize_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, DecodeError> {
        visitor.visit_map(Fields {
            de: self,
            fields: fields.iter(),
            value: None,
        })
    }
    fn deserialize_enum<V: Visitor<'de>>(
        self,
        _name: &'static str,
        variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, DecodeError> {
        visitor.visit_enum(Variant { de: self, variants })
    }
    fn deserialize_identifier<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DecodeError> {
        self.deserialize_str(visitor)
    }
    fn deserialize_ignored_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DecodeError> {
        visitor.visit_unit()
    }
}

struct NodeSeq<'de, I> {
    de: NodeDeserializer<'de>,
    nodes: I,
}

impl<'de, I: Iterator<Item = &'de Node>> SeqAccess<'de> for NodeSeq<'de, I> {
    type Error = DecodeError;

    fn next_element_seed<T: DeserializeSeed<'de>>(
        &mut self,
        seed: T,
    ) -> Result<Option<T::Value>, DecodeError> {
        match self.nodes.next() {
            Some(node) => seed.deserialize(self.de.with(node)).map(Some),
            None => Ok(None),
        }
    }
}

/// Children keyed by their token name.
struct ChildMap<'de> {
    de: NodeDeserializer<'de>,
    children: std::slice::Iter<'de, Node>,
    value: Option<&'de Node>,
}

impl<'de> MapAccess<'de> for ChildMap<'de> {
    type Error = DecodeError;

    fn next_key_seed<K: DeserializeSeed<'de>>(
        &mut self,
        seed: K,
    ) -> Result<Option<K::Value>, DecodeError> {
        let Some(child) = self.children.next() else {
            return Ok(None);
        };
        self.value = Some(child);
        let name = self.de.with(child).name();
        seed.deserialize(BorrowedStrDeserializer::new(name)).map(Some)
    }

    fn next_value_seed<V: DeserializeSeed<'de>>(&mut self, seed: V) -> Result<V::Value, DecodeError> {
        match self.value.take() {
            Some(child) => seed.deserialize(self.de.with(child)),
            None => Err(de::Error::custom("Map value requested before its key")),
        }
    }
}

/// Struct fields, each gathering the children named after it.
struct Fields<'de> {
    de: NodeDeserializer<'de>,
    fields: std::slice::Iter<'static, &'static str>,
    value: Option<Vec<&'de Node>>,
}

impl<'de> MapAccess<'de> for Fields<'de> {
    type Error = DecodeError;

    fn next_key_seed<K: DeserializeSeed<'de>>(
        &mut self,
        seed: K,
    ) -> Result<Option<K::Value>, DecodeError> {
        let node: &'de Node = self.de.node;
        for &field in self.fields.by_ref() {
            let nodes: Vec<&'de Node> = node.children_named(field, self.de.grammar).collect();
            // missing fields are left to serde, which turns them into `None` or an error
            if nodes.is_empty() {
                continue;
            }
            self.value = Some(nodes);
            return seed.deserialize(field.into_deserializer()).map(Some);
        }
        Ok(None)
    }

    fn next_value_seed<V: DeserializeSeed<'de>>(&mut self, seed: V) -> Result<V::Value, DecodeError> {
        match self.value.take() {
            Some(nodes) => seed.deserialize(FieldDeserializer { de: self.de, nodes }),
            None => Err(de::Error::custom("Field value requested before its key")),
        }
    }
}

/// One or more children sharing a token name.
struct FieldDeserializer<'de> {
    de: NodeDeserializer<'de>,
    nodes: Vec<&'de Node>,
}

impl<'de> FieldDeserializer<'de> {
    fn single(&self) -> NodeDeserializer<'de> {
        match self.nodes.first() {
            Some(node) => self.de.with(node),
            None => self.de,
        }
    }
}

macro_rules! forward_to_single {
    ($($method:ident($($arg:ident: $ty:ty),*)),* $(,)?) => {
        $(
            fn $method<V: Visitor<'de>>(self, $($arg: $ty,)* visitor: V) -> Result<V::Value, DecodeError> {
                self.single().$method($($arg,)* visitor)
            }
        )*
    };
}

impl<'de> Deserializer<'de> for FieldDeserializer<'de> {
    type Error = DecodeError;

    forward_to_single! {
        deserialize_any(),
        deserialize_bool(),
        deserialize_i8(),
        deserialize_i16(),
        deserialize_i32(),
        deserialize_i64(),
        deserialize_u8(),
        deserialize_u16(),
        deserialize_u32(),
        deserialize_u64(),
        deserialize_f32(),
        deserialize_f64(),
        deserialize_char(),
        deserialize_str(),
        deserialize_string(),
        deserialize_bytes(),
        deserialize_byte_buf(),
        deserialize_unit(),
        deserialize_unit_struct(name: &'static str),
        deserialize_newtype_struct(name: &'static str),
        deserialize_map(),
        deserialize_struct(name: &'static str, fields: &'static [&'static str]),
        deserialize_enum(name: &'static str, variants: &'static [&'static str]),
        deserialize_identifier(),
        deserialize_ignored_any(),
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DecodeError> {
        visitor.visit_some(self)
    }
    fn deserialize_seq<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DecodeError> {
        visitor.visit_seq(NodeSeq {
            de: self.de,
            nodes: self.nodes.into_iter(),
        })
    }
    fn deserialize_tuple<V: Visitor<'de>>(self, _len: usize, visitor: V) -> Result<V::Value, DecodeError> {
        self.deserialize_seq(visitor)
    }
    fn deserialize_tuple_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _len: usize,
        visitor: V,
    ) -> Result<V::Value, DecodeError> {
        self.deserialize_seq(visitor)
    }
}

/// The variant is named by the node's token, by the token of its only child or by the matched
/// text, whichever names a variant first.
struct Variant<'de> {
    de: NodeDeserializer<'de>,
    variants: &'static [&'static str],
}

impl<'de> EnumAccess<'de> for Variant<'de> {
    type Error = DecodeError;
    type Variant = NodeDeserializer<'de>;

    fn variant_seed<V: DeserializeSeed<'de>>(
        self,
        seed: V,
    ) -> Result<(V::Value, Self::Variant), DecodeError> {
        let de = self.de;
        let mut candidates = vec![(de.name(), de)];
        if let [child] = de.node.children() {
            let child = de.with(child);
            candidates.push((child.name(), child));
        }
        candidates.push((de.text(), de));

        let Some((name, content)) = candidates
            .into_iter()
            .find(|(name, _)| self.variants.iter().any(|variant| variant == name))
        else {
            return Err(DecodeError::UnknownVariant {
                name: de.name().to_owned(),
                expected: self.variants,
            });
        };

        let value = seed.deserialize(BorrowedStrDeserializer::new(name))?;
        Ok((value, content))
    }
}

impl<'de> VariantAccess<'de> for NodeDeserializer<'de> {
    type Error = DecodeError;

    fn unit_variant(self) -> Result<(), DecodeError> {
        Ok(())
    }
    fn newtype_variant_seed<T: DeserializeSeed<'de>>(self, seed: T) -> Result<T::Value, DecodeError> {
        seed.deserialize(self)
    }
    fn tuple_variant<V: Visitor<'de>>(self, _len: usize, visitor: V) -> Result<V::Value, DecodeError> {
        self.deserialize_seq(visitor)
    }
    fn struct_variant<V: Visitor<'de>>(
        self,
        fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, DecodeError> {
        self.deserialize_struct("", fields, visitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        charset::{CharClass, CharSet},
        grammar::RuleHandle,
        parser::ParseOptions,
        tree::build,
    };
    use serde::Deserialize;

    fn named(grammar: &mut Grammar, name: &str, rule: RuleHandle) -> RuleHandle {
        let token = grammar.token(name);
        grammar.structural(rule, token)
    }

    /// entry = key "=" value ("," flag)?
    fn entries() -> Grammar {
        let mut grammar = Grammar::new();
        let letter = grammar.char_set(CharSet::class(CharClass::Letter));
        let letters = grammar.one_or_more(letter);
        let key = named(&mut grammar, "key", letters);

        let digit = grammar.char_set(CharSet::class(CharClass::DecimalDigit));
        let digits = grammar.one_or_more(digit);
        let value = named(&mut grammar, "value", digits);

        let flag = grammar.literal("on");
        let flag = named(&mut grammar, "flag", flag);
        let comma = grammar.literal(",");
        let tail = grammar.sequence(vec![comma, flag]);
        let tail = grammar.optional(tail);

        let equals = grammar.literal("=");
        let body = grammar.sequence(vec![key, equals, value, tail]);
        let entry = named(&mut grammar, "entry", body);
        grammar.add_root(entry);
        grammar
    }

    #[derive(Deserialize, PartialEq, Debug)]
    struct Entry<'a> {
        key: &'a str,
        value: u32,
        flag: Option<String>,
    }

    #[test]
    fn struct_fields_from_children() {
        let grammar = entries();

        let source = "abc=42";
        let tree: Node = build(&grammar, source, &ParseOptions::default()).unwrap();
        let entry: Entry = from_node(&tree, source, &grammar).unwrap();
        assert_eq!(
            entry,
            Entry {
                key: "abc",
                value: 42,
                flag: None
            }
        );

        let source = "x=1,on";
        let tree: Node = build(&grammar, source, &ParseOptions::default()).unwrap();
        let entry: Entry = from_node(&tree, source, &grammar).unwrap();
        assert_eq!(entry.flag.as_deref(), Some("on"));
    }

    #[test]
    fn repeated_children_decode_as_sequence() {
        // list = (item ",")* item
        let mut grammar = Grammar::new();
        let digit = grammar.char_set(CharSet::class(CharClass::DecimalDigit));
        let digits = grammar.one_or_more(digit);
        let item = named(&mut grammar, "item", digits);
        let comma = grammar.literal(",");
        let separated = grammar.sequence(vec![item, comma]);
        let separated = grammar.zero_or_more(separated);
        let body = grammar.sequence(vec![separated, item]);
        let list = named(&mut grammar, "list", body);
        grammar.add_root(list);

        #[derive(Deserialize)]
        struct List {
            item: Vec<u8>,
        }

        let source = "1,20,3";
        let tree: Node = build(&grammar, source, &ParseOptions::default()).unwrap();
        let list: List = from_node(&tree, source, &grammar).unwrap();
        assert_eq!(list.item, [1, 20, 3]);

        let items: Vec<u8> = from_node(&tree, source, &grammar).unwrap();
        assert_eq!(items, [1, 20, 3]);
    }

    #[test]
    fn invalid_scalar() {
        let grammar = entries();
        let source = "abc=42";
        let tree: Node = build(&grammar, source, &ParseOptions::default()).unwrap();
        let key = tree.child("key", &grammar).unwrap();
        let error = from_node::<u32>(key, source, &grammar).unwrap_err();
        assert_eq!(
            error,
            DecodeError::InvalidScalar {
                text: "abc".to_owned(),
                expected: "u32"
            }
        );
    }

    #[test]
    fn enums_by_token_name() {
        let grammar = entries();

        #[derive(Deserialize, PartialEq, Debug)]
        #[serde(rename_all = "lowercase")]
        enum Part {
            Key(String),
            Value(u64),
            Flag,
        }

        let source = "k=7,on";
        let tree: Node = build(&grammar, source, &ParseOptions::default()).unwrap();
        let parts: Vec<Part> = from_node(&tree, source, &grammar).unwrap();
        assert_eq!(parts, [Part::Key("k".to_owned()), Part::Value(7), Part::Flag]);
    }
}
