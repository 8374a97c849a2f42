//! Common types shared by the other `rirc` crates: channel name handling,
//! case mapping, and mode configuration/vectors.

pub mod casemap;
pub mod modes;

pub use casemap::CaseMapping;
pub use modes::{ModeChange, ModeClass, ModeConfig, ModeParseError, ModeVector};

use std::borrow::Borrow;
use std::hash::{Hash, Hasher};
use std::ops::Deref;

/// Channel names according to RFC 2812, section 1.3. Channel names are
/// case insensitive. `ChanName` implements `Eq`/`Hash`/`Ord` against the
/// default case mapping (`rfc1459`) for use in the presentation layer's
/// own bookkeeping (tabs, config); protocol-level uniqueness, which must
/// honour a server's *currently advertised* `CASEMAPPING`, is decided
/// explicitly via [`CaseMapping::eq`] rather than through this type's
/// trait impls — see `libtiny_client::state`.
#[derive(Debug, Clone)]
pub struct ChanName(String);

/// Slice version of `ChanName`.
#[derive(Debug)]
pub struct ChanNameRef(str);

impl Deref for ChanName {
    type Target = ChanNameRef;

    fn deref(&self) -> &Self::Target {
        self.as_ref()
    }
}

impl AsRef<ChanNameRef> for ChanName {
    fn as_ref(&self) -> &ChanNameRef {
        ChanNameRef::new(self.0.as_ref())
    }
}

impl Borrow<ChanNameRef> for ChanName {
    fn borrow(&self) -> &ChanNameRef {
        self.as_ref()
    }
}

impl ChanName {
    pub fn new(name: String) -> Self {
        ChanName(name)
    }

    pub fn display(&self) -> &str {
        &self.0
    }
}

impl ChanNameRef {
    pub fn new(name: &str) -> &Self {
        unsafe { &*(name as *const str as *const ChanNameRef) }
    }

    pub fn display(&self) -> &str {
        &self.0
    }

    /// Normalized under the default (`rfc1459`) case mapping. Prefer
    /// [`ChanNameRef::eq_under`] for protocol-level comparisons, which
    /// respects the server's live `CASEMAPPING`.
    pub fn normalized(&self) -> String {
        CaseMapping::default().fold_str(&self.0)
    }

    /// Whether this channel name is the first character of a channel
    /// prefix recognised by RFC 2812 (`#`, `&`, `+`, `!`). Used to
    /// distinguish channel targets from nick targets when routing
    /// PRIVMSG/NOTICE.
    pub fn is_channel_name(s: &str) -> bool {
        matches!(s.chars().next(), Some('#') | Some('&') | Some('+') | Some('!'))
    }

    pub fn eq_under(&self, other: &ChanNameRef, casemap: CaseMapping) -> bool {
        casemap.eq(&self.0, &other.0)
    }
}

impl ToOwned for ChanNameRef {
    type Owned = ChanName;

    fn to_owned(&self) -> Self::Owned {
        ChanName(self.0.to_owned())
    }
}

impl PartialEq for ChanName {
    fn eq(&self, other: &Self) -> bool {
        let self_borrowed: &ChanNameRef = self.borrow();
        let other_borrowed: &ChanNameRef = other.borrow();
        self_borrowed.eq(other_borrowed)
    }
}

impl Eq for ChanName {}

impl PartialEq<ChanNameRef> for ChanName {
    fn eq(&self, other: &ChanNameRef) -> bool {
        let self_borrowed: &ChanNameRef = self.borrow();
        self_borrowed.eq(other)
    }
}

impl Hash for ChanName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        let self_borrowed: &ChanNameRef = self.borrow();
        self_borrowed.hash(state)
    }
}

impl PartialEq for ChanNameRef {
    fn eq(&self, other: &Self) -> bool {
        self.eq_under(other, CaseMapping::default())
    }
}

impl Eq for ChanNameRef {}

impl PartialEq<ChanName> for ChanNameRef {
    fn eq(&self, other: &ChanName) -> bool {
        let other_borrowed: &ChanNameRef = other.borrow();
        self.eq(other_borrowed)
    }
}

impl Hash for ChanNameRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        let folded = CaseMapping::default().fold_str(&self.0);
        folded.len().hash(state);
        for c in folded.chars() {
            c.hash(state);
        }
    }
}

/// What a buffer line represents, driving colouring/filtering at the UI
/// boundary; the core only stores the tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MsgLineType {
    Chat,
    Join,
    Part,
    Quit,
    Nick,
    Pinged,
    Action,
    Info,
    Error,
}

/// Where a line shown in a tab came from. Owned: tabs keep one of these
/// around for the lifetime of the tab, and `Event`s carry one back from the
/// UI to identify which tab a user command/message was entered in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MsgSource {
    Serv { serv: String },
    Chan { serv: String, chan: ChanName },
    User { serv: String, nick: String },
}

impl MsgSource {
    pub fn serv_name(&self) -> &str {
        match self {
            MsgSource::Serv { serv }
            | MsgSource::Chan { serv, .. }
            | MsgSource::User { serv, .. } => serv,
        }
    }

    /// Borrowed `MsgTarget` pointing at the same tab. Doesn't handle
    /// `Serv` -> `AllServTabs` promotion; callers that need that still do it
    /// themselves (the semantics differ depending on why we're targeting the
    /// server tab).
    pub fn to_target(&self) -> MsgTarget {
        match self {
            MsgSource::Serv { serv } => MsgTarget::Server { serv },
            MsgSource::Chan { serv, chan } => MsgTarget::Chan { serv, chan },
            MsgSource::User { serv, nick } => MsgTarget::User { serv, nick },
        }
    }

    pub fn visible_name(&self) -> &str {
        match self {
            MsgSource::Serv { serv } => serv,
            MsgSource::Chan { chan, .. } => chan.display(),
            MsgSource::User { nick, .. } => nick,
        }
    }
}

/// A tab to show a line in. Borrowed: built on the fly wherever a line needs
/// to be routed to a tab.
#[derive(Debug, Clone, Copy)]
pub enum MsgTarget<'a> {
    Server { serv: &'a str },
    Chan { serv: &'a str, chan: &'a ChanNameRef },
    User { serv: &'a str, nick: &'a str },
    /// All tabs (server + channel + user tabs) belonging to a server.
    AllServTabs { serv: &'a str },
    CurrentTab,
}

/// Visual treatment of a tab, in increasing order of urgency. Used to decide
/// whether a new style should replace the current one without clobbering a
/// more urgent pending notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TabStyle {
    Normal,
    JoinOrPart,
    NewMsg,
    Highlight,
}

/// Events sent from the UI (input line, tab commands) down to the part of
/// the client that talks to servers.
#[derive(Debug)]
pub enum Event {
    /// User asked to quit (e.g. Ctrl-c, or `/quit` with no connections left).
    Abort,
    Msg { msg: String, source: MsgSource },
    Lines { lines: Vec<String>, source: MsgSource },
    Cmd { cmd: String, source: MsgSource },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chan_name_eq_is_case_insensitive() {
        let a = ChanName::new("#Rust".to_owned());
        let b = ChanName::new("#rust".to_owned());
        assert_eq!(a, b);
    }

    #[test]
    fn chan_name_eq_under_honours_explicit_casemap() {
        let a = ChanNameRef::new("#a~b");
        let b = ChanNameRef::new("#a^b");
        assert!(a.eq_under(b, CaseMapping::Rfc1459));
        assert!(!a.eq_under(b, CaseMapping::StrictRfc1459));
    }

    #[test]
    fn is_channel_name_recognises_rfc2812_prefixes() {
        assert!(ChanNameRef::is_channel_name("#foo"));
        assert!(ChanNameRef::is_channel_name("&local"));
        assert!(!ChanNameRef::is_channel_name("alice"));
    }
}
