//! Matcher system for the Beacon framework.
//!
//! A [`Matcher`] is a predicate deciding whether a route applies to a
//! [`MessageContext`]. Routes hold a list of matchers that must all pass.
//!
//! Matchers are pure, with one intentional exception: [`CommandMatcher`]
//! writes the parsed command and its arguments into the context metadata when
//! it matches, so handlers do not have to parse the text again.
//!
//! # Example
//!
//! ```rust,ignore
//! use beacon_framework::matcher::{self, CommandMatcher};
//!
//! let route = Route::new("login", handler)
//!     .with_matcher(matcher::is_group())
//!     .with_matcher(CommandMatcher::new("/", ["login", "signin"]))
//!     .with_matcher(matcher::not(matcher::from_users([10001])));
//! ```

use std::collections::HashSet;
use std::sync::Arc;

use regex::Regex;

use beacon_core::{GroupId, MessageContext, UserId, Variant, keys};

use crate::error::MatchCompileError;

/// A predicate over a message context.
pub trait Matcher: Send + Sync {
    /// Returns `true` if the context satisfies this matcher.
    fn matches(&self, ctx: &MessageContext) -> bool;
}

/// A shared, type-erased matcher.
pub type BoxedMatcher = Arc<dyn Matcher>;

/// Conversion into a [`BoxedMatcher`].
pub trait IntoMatcher {
    /// Boxes the matcher.
    fn into_matcher(self) -> BoxedMatcher;
}

impl<M: Matcher + 'static> IntoMatcher for M {
    fn into_matcher(self) -> BoxedMatcher {
        Arc::new(self)
    }
}

impl IntoMatcher for BoxedMatcher {
    fn into_matcher(self) -> BoxedMatcher {
        self
    }
}

// ============================================================================
// Variant
// ============================================================================

/// Matches messages of one variant.
#[derive(Debug, Clone, Copy)]
pub struct VariantMatcher {
    variant: Variant,
}

impl VariantMatcher {
    /// Creates a matcher for `variant`.
    pub fn new(variant: Variant) -> Self {
        Self { variant }
    }
}

impl Matcher for VariantMatcher {
    fn matches(&self, ctx: &MessageContext) -> bool {
        match self.variant {
            Variant::Private => ctx.private().is_some(),
            Variant::Group => ctx.group().is_some(),
            Variant::Temp => ctx.temp().is_some(),
        }
    }
}

/// Matches private messages.
pub fn is_private() -> VariantMatcher {
    VariantMatcher::new(Variant::Private)
}

/// Matches group messages.
pub fn is_group() -> VariantMatcher {
    VariantMatcher::new(Variant::Group)
}

/// Matches temporary-conversation messages.
pub fn is_temp() -> VariantMatcher {
    VariantMatcher::new(Variant::Temp)
}

// ============================================================================
// Text
// ============================================================================

/// Matches when the text contains a pattern.
///
/// Case-insensitive unless built with [`TextMatcher::case_sensitive`].
/// Empty text never matches.
#[derive(Debug, Clone)]
pub struct TextMatcher {
    pattern: String,
    case_sensitive: bool,
}

impl TextMatcher {
    /// Creates a case-insensitive matcher.
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            case_sensitive: false,
        }
    }

    /// Creates an exact-case matcher.
    pub fn case_sensitive(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            case_sensitive: true,
        }
    }
}

impl Matcher for TextMatcher {
    fn matches(&self, ctx: &MessageContext) -> bool {
        let text = ctx.text();
        if text.is_empty() {
            return false;
        }

        if self.case_sensitive {
            text.contains(&self.pattern)
        } else {
            text.to_lowercase()
                .contains(&self.pattern.to_lowercase())
        }
    }
}

/// Matches when the text matches a regular expression.
///
/// Empty text never matches.
#[derive(Debug, Clone)]
pub struct RegexMatcher {
    regex: Regex,
}

impl RegexMatcher {
    /// Compiles `pattern`.
    pub fn new(pattern: &str) -> Result<Self, MatchCompileError> {
        let regex = Regex::new(pattern).map_err(|source| MatchCompileError {
            pattern: pattern.to_string(),
            source,
        })?;
        Ok(Self { regex })
    }
}

impl Matcher for RegexMatcher {
    fn matches(&self, ctx: &MessageContext) -> bool {
        let text = ctx.text();
        !text.is_empty() && self.regex.is_match(text)
    }
}

/// Matches when the text starts with a prefix (case-sensitive).
#[derive(Debug, Clone)]
pub struct PrefixMatcher {
    prefix: String,
}

impl PrefixMatcher {
    /// Creates a prefix matcher.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl Matcher for PrefixMatcher {
    fn matches(&self, ctx: &MessageContext) -> bool {
        ctx.text().starts_with(&self.prefix)
    }
}

// ============================================================================
// Identity
// ============================================================================

/// Matches messages from a fixed set of senders.
#[derive(Debug, Clone)]
pub struct SenderMatcher {
    user_ids: HashSet<UserId>,
}

impl SenderMatcher {
    /// Creates a sender allow-list.
    pub fn new(user_ids: impl IntoIterator<Item = UserId>) -> Self {
        Self {
            user_ids: user_ids.into_iter().collect(),
        }
    }
}

impl Matcher for SenderMatcher {
    fn matches(&self, ctx: &MessageContext) -> bool {
        self.user_ids.contains(&ctx.sender_id())
    }
}

/// Matches messages from senders in `user_ids`.
pub fn from_users(user_ids: impl IntoIterator<Item = UserId>) -> SenderMatcher {
    SenderMatcher::new(user_ids)
}

/// Matches messages belonging to a fixed set of groups.
///
/// Private messages have no group and never match.
#[derive(Debug, Clone)]
pub struct GroupMatcher {
    group_ids: HashSet<GroupId>,
}

impl GroupMatcher {
    /// Creates a group allow-list.
    pub fn new(group_ids: impl IntoIterator<Item = GroupId>) -> Self {
        Self {
            group_ids: group_ids.into_iter().collect(),
        }
    }
}

impl Matcher for GroupMatcher {
    fn matches(&self, ctx: &MessageContext) -> bool {
        ctx.group_id()
            .is_some_and(|group_id| self.group_ids.contains(&group_id))
    }
}

/// Matches messages from groups in `group_ids`.
pub fn in_groups(group_ids: impl IntoIterator<Item = GroupId>) -> GroupMatcher {
    GroupMatcher::new(group_ids)
}

/// Matches group messages that mention a given user.
#[derive(Debug, Clone, Copy)]
pub struct MentionMatcher {
    target: UserId,
}

impl MentionMatcher {
    /// Creates a matcher for mentions of `target`.
    pub fn new(target: UserId) -> Self {
        Self { target }
    }
}

impl Matcher for MentionMatcher {
    fn matches(&self, ctx: &MessageContext) -> bool {
        ctx.group().is_some_and(|group| {
            group
                .elements
                .iter()
                .any(|segment| segment.as_mention() == Some(self.target))
        })
    }
}

// ============================================================================
// Command
// ============================================================================

/// Matches `<prefix><command> [args...]`.
///
/// On a match, writes the command under [`keys::COMMAND`] (`String`) and the
/// remaining whitespace-separated tokens under [`keys::ARGS`]
/// (`Vec<String>`). Nothing is written when the text does not match.
#[derive(Debug, Clone)]
pub struct CommandMatcher {
    prefix: String,
    commands: HashSet<String>,
}

impl CommandMatcher {
    /// Creates a command matcher. An empty prefix matches bare commands.
    pub fn new<I, S>(prefix: impl Into<String>, commands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            prefix: prefix.into(),
            commands: commands.into_iter().map(Into::into).collect(),
        }
    }

    /// Parses `text` into a known command and its arguments.
    pub fn parse<'a>(&self, text: &'a str) -> Option<(&'a str, Vec<String>)> {
        let rest = text.strip_prefix(self.prefix.as_str())?;
        let mut parts = rest.split_whitespace();
        let command = parts.next()?;
        if !self.commands.contains(command) {
            return None;
        }
        Some((command, parts.map(str::to_string).collect()))
    }
}

impl Matcher for CommandMatcher {
    fn matches(&self, ctx: &MessageContext) -> bool {
        let text = ctx.text();
        if text.is_empty() {
            return false;
        }

        match self.parse(text) {
            Some((command, args)) => {
                ctx.set(keys::COMMAND, command.to_string());
                ctx.set(keys::ARGS, args);
                true
            }
            None => false,
        }
    }
}

// ============================================================================
// Combinators
// ============================================================================

/// Matches when every inner matcher matches. Empty is vacuously true.
#[derive(Clone, Default)]
pub struct AndMatcher {
    matchers: Vec<BoxedMatcher>,
}

impl AndMatcher {
    /// Creates an AND over `matchers`.
    pub fn new(matchers: Vec<BoxedMatcher>) -> Self {
        Self { matchers }
    }
}

impl Matcher for AndMatcher {
    fn matches(&self, ctx: &MessageContext) -> bool {
        self.matchers.iter().all(|m| m.matches(ctx))
    }
}

/// Matches when any inner matcher matches. Empty is vacuously false.
#[derive(Clone, Default)]
pub struct OrMatcher {
    matchers: Vec<BoxedMatcher>,
}

impl OrMatcher {
    /// Creates an OR over `matchers`.
    pub fn new(matchers: Vec<BoxedMatcher>) -> Self {
        Self { matchers }
    }
}

impl Matcher for OrMatcher {
    fn matches(&self, ctx: &MessageContext) -> bool {
        self.matchers.iter().any(|m| m.matches(ctx))
    }
}

/// Negates a matcher.
#[derive(Clone)]
pub struct NotMatcher {
    matcher: BoxedMatcher,
}

impl NotMatcher {
    /// Creates the negation of `matcher`.
    pub fn new(matcher: impl IntoMatcher) -> Self {
        Self {
            matcher: matcher.into_matcher(),
        }
    }
}

impl Matcher for NotMatcher {
    fn matches(&self, ctx: &MessageContext) -> bool {
        !self.matcher.matches(ctx)
    }
}

/// A type-erased predicate function.
pub type CheckFn = Arc<dyn Fn(&MessageContext) -> bool + Send + Sync>;

/// Wraps an arbitrary predicate.
#[derive(Clone)]
pub struct CustomMatcher {
    check: CheckFn,
}

impl CustomMatcher {
    /// Creates a matcher from a closure.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&MessageContext) -> bool + Send + Sync + 'static,
    {
        Self { check: Arc::new(f) }
    }
}

impl Matcher for CustomMatcher {
    fn matches(&self, ctx: &MessageContext) -> bool {
        (self.check)(ctx)
    }
}

/// Builds an [`AndMatcher`].
pub fn and(matchers: Vec<BoxedMatcher>) -> AndMatcher {
    AndMatcher::new(matchers)
}

/// Builds an [`OrMatcher`].
pub fn or(matchers: Vec<BoxedMatcher>) -> OrMatcher {
    OrMatcher::new(matchers)
}

/// Builds a [`NotMatcher`].
pub fn not(matcher: impl IntoMatcher) -> NotMatcher {
    NotMatcher::new(matcher)
}

/// Builds a [`CustomMatcher`].
pub fn custom<F>(f: F) -> CustomMatcher
where
    F: Fn(&MessageContext) -> bool + Send + Sync + 'static,
{
    CustomMatcher::new(f)
}
