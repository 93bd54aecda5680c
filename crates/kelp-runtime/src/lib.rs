pub mod annotation;
pub mod behaviour;
pub mod charset;
pub mod cursor;
pub mod de;
pub mod error;
pub mod grammar;
pub mod ir;
pub mod node;
pub mod parser;
pub mod rule;
pub mod span;
pub mod stream;
pub mod trace;
pub mod tree;

pub use annotation::{AnnotationKey, AnnotationValue, Annotations};
pub use behaviour::{Behaviour, BehaviourKind, Cardinality};
pub use charset::{CharClass, CharSet};
pub use error::{ParseError, ParseErrors};
pub use grammar::{Grammar, GrammarError, RuleHandle, TokenHandle, ValueType};
pub use ir::{IntermediateRepresentation, MatchResult, Site, Tee};
pub use node::{Node, TreeNode, Value, ValueNode};
pub use parser::{ParseOptions, Parser};
pub use span::Span;
pub use stream::{StreamToken, TokenStream};
pub use trace::Trace;
pub use tree::{build, TreeBuilder};
