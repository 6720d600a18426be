//! Enum <-> byte tag mappings for the parse-tree (template context)
//! serialization. Kept local to the artifact format so the core enums
//! stay free of serialization concerns.

use tern_ir::{LitKind, ModKind, NodeKind, NumberSuffix, OpKind};

pub(crate) const NONE_TAG: u8 = 0xff;

pub(crate) const NODE_KINDS: [NodeKind; 30] = [
    NodeKind::Root,
    NodeKind::Block,
    NodeKind::Expression,
    NodeKind::Literal,
    NodeKind::Identifier,
    NodeKind::TypeSpecifier,
    NodeKind::TypeAlias,
    NodeKind::Variable,
    NodeKind::ObjectDecompositor,
    NodeKind::Function,
    NodeKind::Class,
    NodeKind::Property,
    NodeKind::Modifier,
    NodeKind::If,
    NodeKind::WhileLoop,
    NodeKind::DoWhileLoop,
    NodeKind::ForLoop,
    NodeKind::Switch,
    NodeKind::SwitchCase,
    NodeKind::Return,
    NodeKind::Break,
    NodeKind::Continue,
    NodeKind::Import,
    NodeKind::ImportSymbol,
    NodeKind::Export,
    NodeKind::Try,
    NodeKind::Catch,
    NodeKind::Throw,
    NodeKind::New,
    NodeKind::Error,
];

pub(crate) const OP_KINDS: [OpKind; 45] = [
    OpKind::Add,
    OpKind::Sub,
    OpKind::Mul,
    OpKind::Div,
    OpKind::Mod,
    OpKind::Shl,
    OpKind::Shr,
    OpKind::BitAnd,
    OpKind::BitOr,
    OpKind::BitXor,
    OpKind::LogAnd,
    OpKind::LogOr,
    OpKind::Not,
    OpKind::Invert,
    OpKind::Negate,
    OpKind::Eq,
    OpKind::NotEq,
    OpKind::Less,
    OpKind::LessEq,
    OpKind::Greater,
    OpKind::GreaterEq,
    OpKind::Assign,
    OpKind::AddAssign,
    OpKind::SubAssign,
    OpKind::MulAssign,
    OpKind::DivAssign,
    OpKind::ModAssign,
    OpKind::BitAndAssign,
    OpKind::BitOrAssign,
    OpKind::BitXorAssign,
    OpKind::ShlAssign,
    OpKind::ShrAssign,
    OpKind::LogAndAssign,
    OpKind::LogOrAssign,
    OpKind::PreInc,
    OpKind::PostInc,
    OpKind::PreDec,
    OpKind::PostDec,
    OpKind::Conditional,
    OpKind::Comma,
    OpKind::Call,
    OpKind::Index,
    OpKind::Member,
    OpKind::Cast,
    OpKind::Sizeof,
];

pub(crate) const MOD_KINDS: [ModKind; 7] = [
    ModKind::Public,
    ModKind::Private,
    ModKind::Static,
    ModKind::Getter,
    ModKind::Setter,
    ModKind::Const,
    ModKind::Operator,
];

pub(crate) const SUFFIXES: [NumberSuffix; 11] = [
    NumberSuffix::None,
    NumberSuffix::B,
    NumberSuffix::S,
    NumberSuffix::L,
    NumberSuffix::Ll,
    NumberSuffix::U,
    NumberSuffix::Ub,
    NumberSuffix::Us,
    NumberSuffix::Ul,
    NumberSuffix::Ull,
    NumberSuffix::F,
];

pub(crate) fn tag_of<T: PartialEq>(table: &[T], value: &T) -> u8 {
    table
        .iter()
        .position(|t| t == value)
        .expect("value missing from tag table") as u8
}

/// `LitKind` serialized as (family tag, suffix tag).
pub(crate) fn lit_tags(lit: LitKind) -> (u8, u8) {
    match lit {
        LitKind::Int(sfx) => (0, tag_of(&SUFFIXES, &sfx)),
        LitKind::Float(sfx) => (1, tag_of(&SUFFIXES, &sfx)),
        LitKind::Str => (2, 0),
        LitKind::TemplateStr => (3, 0),
        LitKind::Bool => (4, 0),
        LitKind::Null => (5, 0),
    }
}

pub(crate) fn lit_from_tags(family: u8, suffix: u8) -> Option<LitKind> {
    let sfx = SUFFIXES.get(suffix as usize).copied();
    Some(match family {
        0 => LitKind::Int(sfx?),
        1 => LitKind::Float(sfx?),
        2 => LitKind::Str,
        3 => LitKind::TemplateStr,
        4 => LitKind::Bool,
        5 => LitKind::Null,
        _ => return None,
    })
}
