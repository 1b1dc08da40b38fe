//! The calculation classes ("rule prob, head prob, unary, main, left,
//! right, ...") and the sub-feature functions each one conditions on. A
//! history is whatever the current partial derivation can offer; not every
//! sub-feature is always available (e.g. there may be no grandparent near
//! the root), which is why [`History`] stores `Option<i64>`.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CalcClass {
    Rule,
    Head,
    Unary,
    Main,
    Left,
    Right,
    HeadTag,
    PriorCategory,
    Conjunction,
    CommaRule,
    ParenRule,
    StopRule,
}

impl CalcClass {
    pub const ALL: [CalcClass; 12] = [
        CalcClass::Rule,
        CalcClass::Head,
        CalcClass::Unary,
        CalcClass::Main,
        CalcClass::Left,
        CalcClass::Right,
        CalcClass::HeadTag,
        CalcClass::PriorCategory,
        CalcClass::Conjunction,
        CalcClass::CommaRule,
        CalcClass::ParenRule,
        CalcClass::StopRule,
    ];

    pub fn file_stem(self) -> &'static str {
        match self {
            CalcClass::Rule => "rule",
            CalcClass::Head => "head",
            CalcClass::Unary => "unary",
            CalcClass::Main => "main",
            CalcClass::Left => "left",
            CalcClass::Right => "right",
            CalcClass::HeadTag => "headtag",
            CalcClass::PriorCategory => "priorcat",
            CalcClass::Conjunction => "conj",
            CalcClass::CommaRule => "comma",
            CalcClass::ParenRule => "paren",
            CalcClass::StopRule => "stop",
        }
    }

    /// The sub-feature list for this class, ordered from most general
    /// (consulted first, at trie depth 0) to most specific. Mirrors the
    /// fixed conditioning orders used by Charniak-style lexicalized models:
    /// category context before headword identity.
    pub fn subfeatures(self) -> &'static [SubFeature] {
        use SubFeature::*;
        match self {
            CalcClass::Rule => &[ParentCategory, GrandparentCategory, HeadTag],
            CalcClass::Head => &[ParentCategory, HeadTag, HeadWordClass],
            CalcClass::Unary => &[ParentCategory, HeadTag],
            CalcClass::Main => &[ParentCategory, HeadTag, HeadWordClass],
            CalcClass::Left => &[ParentCategory, HeadTag, Distance, LeftSiblingCategory],
            CalcClass::Right => &[ParentCategory, HeadTag, Distance, RightSiblingCategory],
            CalcClass::HeadTag => &[ParentCategory, GrandparentCategory],
            CalcClass::PriorCategory => &[ParentCategory],
            CalcClass::Conjunction => &[ParentCategory, ConjFlag],
            CalcClass::CommaRule => &[ParentCategory, LeftSiblingCategory],
            CalcClass::ParenRule => &[ParentCategory],
            CalcClass::StopRule => &[ParentCategory, HeadTag],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubFeature {
    ParentCategory,
    GrandparentCategory,
    HeadTag,
    HeadWordClass,
    LeftSiblingCategory,
    RightSiblingCategory,
    Distance,
    ConjFlag,
}

#[derive(Debug, Clone, Default)]
pub struct History {
    pub parent_category: Option<i64>,
    pub grandparent_category: Option<i64>,
    pub head_tag: Option<i64>,
    pub head_word_class: Option<i64>,
    pub left_sibling_category: Option<i64>,
    pub right_sibling_category: Option<i64>,
    pub distance: Option<i64>,
    pub conj_flag: Option<i64>,
}

impl History {
    pub fn value(&self, sub: SubFeature) -> Option<i64> {
        match sub {
            SubFeature::ParentCategory => self.parent_category,
            SubFeature::GrandparentCategory => self.grandparent_category,
            SubFeature::HeadTag => self.head_tag,
            SubFeature::HeadWordClass => self.head_word_class,
            SubFeature::LeftSiblingCategory => self.left_sibling_category,
            SubFeature::RightSiblingCategory => self.right_sibling_category,
            SubFeature::Distance => self.distance,
            SubFeature::ConjFlag => self.conj_flag,
        }
    }
}
