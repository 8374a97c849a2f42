//! Mode configuration and mode vectors.
//!
//! `ModeConfig` holds the pieces of `RPL_ISUPPORT` (numeric 005) that
//! reconfigure how later `MODE` messages and numeric 324 lines are
//! interpreted: `CHANMODES`, `PREFIX`, and `MODES`. `ModeVector` is the
//! bitset used to track which flags are currently set on a channel or a
//! user.

use crate::casemap::CaseMapping;

/// The four CHANMODES argument-consumption classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeClass {
    /// Always takes a parameter; maintains a list (e.g. bans).
    A,
    /// Always takes a parameter, on both set and unset.
    B,
    /// Takes a parameter only when being set.
    C,
    /// Never takes a parameter.
    D,
    /// A `PREFIX` mode flag (op, voice, ...); always takes a target nick.
    Prefix,
}

/// The CHANMODES=A,B,C,D buckets, plus the PREFIX pairing and MODES limit.
#[derive(Debug, Clone)]
pub struct ModeConfig {
    pub casemapping: CaseMapping,
    /// List modes (e.g. `b` for bans).
    pub chanmodes_a: String,
    /// Always-parameterised modes (e.g. `k`).
    pub chanmodes_b: String,
    /// Set-only-parameterised modes (e.g. `l`).
    pub chanmodes_c: String,
    /// Flag modes (e.g. `imnpst`).
    pub chanmodes_d: String,
    /// `(mode_char, prefix_char)` pairs in rank order, highest first.
    pub prefix: Vec<(char, char)>,
    /// `MODES=` limit: max mode changes per line. `None` if unknown.
    pub modes_limit: Option<usize>,
    /// User modes as seen in numeric 004's `<usermodes>` field.
    pub user_modes: String,
}

impl Default for ModeConfig {
    fn default() -> Self {
        // Matches the common ircd default (and `original_source`'s
        // hardcoded fallback before 004/005 arrive).
        ModeConfig {
            casemapping: CaseMapping::default(),
            chanmodes_a: "beI".to_owned(),
            chanmodes_b: "k".to_owned(),
            chanmodes_c: "l".to_owned(),
            chanmodes_d: "imnpst".to_owned(),
            prefix: vec![('o', '@'), ('v', '+')],
            modes_limit: None,
            user_modes: String::new(),
        }
    }
}

impl ModeConfig {
    /// Parse a `CHANMODES=A,B,C,D` token value. Fewer than 4 comma
    /// separated groups is tolerated (trailing groups default to empty),
    /// matching the lenient ISUPPORT handling in `original_source`.
    pub fn set_chanmodes(&mut self, value: &str) {
        let mut parts = value.splitn(4, ',');
        self.chanmodes_a = parts.next().unwrap_or("").to_owned();
        self.chanmodes_b = parts.next().unwrap_or("").to_owned();
        self.chanmodes_c = parts.next().unwrap_or("").to_owned();
        self.chanmodes_d = parts.next().unwrap_or("").to_owned();
    }

    /// Parse a `PREFIX=(modes)prefixes` token value. Ignored (left
    /// unchanged) if malformed.
    pub fn set_prefix(&mut self, value: &str) {
        if let Some(rest) = value.strip_prefix('(') {
            if let Some(close) = rest.find(')') {
                let modes = &rest[..close];
                let prefixes = &rest[close + 1..];
                if modes.chars().count() == prefixes.chars().count() {
                    self.prefix = modes.chars().zip(prefixes.chars()).collect();
                }
            }
        }
    }

    pub fn set_modes_limit(&mut self, value: &str) {
        if let Ok(n) = value.parse::<usize>() {
            self.modes_limit = Some(n);
        }
    }

    /// Classify a channel-mode flag by consulting CHANMODES/PREFIX. Unknown
    /// flags return `None`.
    pub fn classify(&self, flag: char) -> Option<ModeClass> {
        if self.prefix.iter().any(|&(m, _)| m == flag) {
            Some(ModeClass::Prefix)
        } else if self.chanmodes_a.contains(flag) {
            Some(ModeClass::A)
        } else if self.chanmodes_b.contains(flag) {
            Some(ModeClass::B)
        } else if self.chanmodes_c.contains(flag) {
            Some(ModeClass::C)
        } else if self.chanmodes_d.contains(flag) {
            Some(ModeClass::D)
        } else {
            None
        }
    }

    /// Does this class consume the next parameter when the flag is being
    /// set (`sign == true`) or unset (`sign == false`)?
    pub fn takes_arg(class: ModeClass, sign: bool) -> bool {
        match class {
            ModeClass::A | ModeClass::B | ModeClass::Prefix => true,
            ModeClass::C => sign,
            ModeClass::D => false,
        }
    }

    /// Prefix character for a given prefix mode flag, if any (e.g. `'o' ->
    /// Some('@')`).
    pub fn prefix_char(&self, mode: char) -> Option<char> {
        self.prefix.iter().find(|&&(m, _)| m == mode).map(|&(_, p)| p)
    }

    /// Rank of a prefix character; lower is higher rank. Used to sort
    /// users within a channel and to pick the "effective" prefix char
    /// shown next to a nick (its highest-ranked mode).
    pub fn prefix_rank(&self, prefix_char: char) -> Option<usize> {
        self.prefix.iter().position(|&(_, p)| p == prefix_char)
    }
}

/// One parsed mode change: `(sign, flag, argument)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModeChange {
    pub sign: bool,
    pub flag: char,
    pub arg: Option<String>,
}

/// Errors surfaced while parsing a MODE message or numeric 324's
/// mode-string, without aborting the rest of the line.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModeParseError {
    #[error("mode string does not start with a sign")]
    MissingLeadingSign,
    #[error("unknown mode flag '{0}'")]
    UnknownFlag(char),
    #[error("mode flag '{0}' expected an argument that was not provided")]
    MissingArg(char),
}

/// Parse a modestring (e.g. `+kl-i`) plus its trailing arguments into a
/// list of `ModeChange`s, consulting `config` to decide argument
/// consumption per §4.2. Unknown flags are collected as errors but do not
/// abort parsing of the remaining flags/args.
pub fn parse_mode_string(
    config: &ModeConfig,
    modestring: &str,
    mut args: std::slice::Iter<'_, &str>,
) -> (Vec<ModeChange>, Vec<ModeParseError>) {
    let mut changes = Vec::new();
    let mut errors = Vec::new();
    let mut sign: Option<bool> = None;

    for c in modestring.chars() {
        match c {
            '+' => sign = Some(true),
            '-' => sign = Some(false),
            flag => {
                let Some(cur_sign) = sign else {
                    errors.push(ModeParseError::MissingLeadingSign);
                    continue;
                };
                match config.classify(flag) {
                    None => errors.push(ModeParseError::UnknownFlag(flag)),
                    Some(class) => {
                        let arg = if ModeConfig::takes_arg(class, cur_sign) {
                            match args.next() {
                                Some(a) => Some((*a).to_owned()),
                                None => {
                                    errors.push(ModeParseError::MissingArg(flag));
                                    None
                                }
                            }
                        } else {
                            None
                        };
                        changes.push(ModeChange {
                            sign: cur_sign,
                            flag,
                            arg,
                        });
                    }
                }
            }
        }
    }

    (changes, errors)
}

/// A bitset over `'a'..='z'` and `'A'..='Z'`, used for channel modes, user
/// modes, and per-user prefix modes within a channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModeVector {
    lower: u32,
    upper: u32,
}

impl ModeVector {
    pub fn new() -> Self {
        ModeVector::default()
    }

    fn bit(c: char) -> Option<(bool, u32)> {
        if c.is_ascii_lowercase() {
            Some((false, 1 << (c as u32 - 'a' as u32)))
        } else if c.is_ascii_uppercase() {
            Some((true, 1 << (c as u32 - 'A' as u32)))
        } else {
            None
        }
    }

    pub fn set(&mut self, c: char) {
        if let Some((upper, bit)) = Self::bit(c) {
            if upper {
                self.upper |= bit;
            } else {
                self.lower |= bit;
            }
        }
    }

    pub fn clear(&mut self, c: char) {
        if let Some((upper, bit)) = Self::bit(c) {
            if upper {
                self.upper &= !bit;
            } else {
                self.lower &= !bit;
            }
        }
    }

    pub fn test(&self, c: char) -> bool {
        match Self::bit(c) {
            Some((true, bit)) => self.upper & bit != 0,
            Some((false, bit)) => self.lower & bit != 0,
            None => false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.lower == 0 && self.upper == 0
    }

    /// Render as `+<flags>`, in alphabetical order (for channel modes), or
    /// empty string if no flags are set.
    pub fn to_alphabetical_string(&self) -> String {
        let mut flags = String::new();
        for c in ('a'..='z').chain('A'..='Z') {
            if self.test(c) {
                flags.push(c);
            }
        }
        if flags.is_empty() {
            String::new()
        } else {
            format!("+{}", flags)
        }
    }

    /// Render the highest-ranked PREFIX-order flags for display next to a
    /// nick, e.g. `@` for an op, or empty if the user holds no prefix
    /// mode.
    pub fn to_prefix_string(&self, config: &ModeConfig) -> String {
        let mut out = String::new();
        for &(mode, prefix) in &config.prefix {
            if self.test(mode) {
                out.push(prefix);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn beiklmnpst() -> ModeConfig {
        let mut c = ModeConfig::default();
        c.set_chanmodes("beI,k,l,imnpst");
        c
    }

    #[test]
    fn classify_buckets() {
        let c = beiklmnpst();
        assert_eq!(c.classify('b'), Some(ModeClass::A));
        assert_eq!(c.classify('k'), Some(ModeClass::B));
        assert_eq!(c.classify('l'), Some(ModeClass::C));
        assert_eq!(c.classify('i'), Some(ModeClass::D));
        assert_eq!(c.classify('o'), Some(ModeClass::Prefix));
        assert_eq!(c.classify('z'), None);
    }

    #[test]
    fn set_prefix_parses_modes_and_prefixes() {
        let mut c = ModeConfig::default();
        c.set_prefix("(ohv)@%+");
        assert_eq!(c.prefix, vec![('o', '@'), ('h', '%'), ('v', '+')]);
        assert_eq!(c.prefix_char('o'), Some('@'));
        assert_eq!(c.prefix_rank('@'), Some(0));
        assert_eq!(c.prefix_rank('+'), Some(2));
    }

    #[test]
    fn malformed_prefix_token_is_ignored() {
        let mut c = ModeConfig::default();
        let before = c.prefix.clone();
        c.set_prefix("(ov)@"); // mismatched arity
        assert_eq!(c.prefix, before);
    }

    // S3 — mode apply with arguments.
    #[test]
    fn s3_mode_apply_with_arguments() {
        let config = beiklmnpst();
        let args = ["secret", "42"];
        let args_iter = args.iter();
        let (changes, errors) = parse_mode_string(&config, "+kl-i", args_iter);
        assert!(errors.is_empty());
        assert_eq!(
            changes,
            vec![
                ModeChange {
                    sign: true,
                    flag: 'k',
                    arg: Some("secret".to_owned())
                },
                ModeChange {
                    sign: true,
                    flag: 'l',
                    arg: Some("42".to_owned())
                },
                ModeChange {
                    sign: false,
                    flag: 'i',
                    arg: None
                },
            ]
        );
    }

    #[test]
    fn leading_flag_without_sign_is_an_error_but_does_not_abort() {
        let config = beiklmnpst();
        let args: [&str; 0] = [];
        let (changes, errors) = parse_mode_string(&config, "i+m", args.iter());
        assert_eq!(errors, vec![ModeParseError::MissingLeadingSign]);
        assert_eq!(
            changes,
            vec![ModeChange {
                sign: true,
                flag: 'm',
                arg: None
            }]
        );
    }

    #[test]
    fn unknown_flag_is_reported_but_does_not_abort() {
        let config = beiklmnpst();
        let args: [&str; 0] = [];
        let (changes, errors) = parse_mode_string(&config, "+zm", args.iter());
        assert_eq!(errors, vec![ModeParseError::UnknownFlag('z')]);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].flag, 'm');
    }

    #[test]
    fn mode_vector_set_clear_test() {
        let mut v = ModeVector::new();
        assert!(!v.test('o'));
        v.set('o');
        assert!(v.test('o'));
        v.clear('o');
        assert!(!v.test('o'));
    }

    #[test]
    fn mode_vector_alphabetical_string() {
        let mut v = ModeVector::new();
        v.set('n');
        v.set('i');
        assert_eq!(v.to_alphabetical_string(), "+in");
    }

    #[test]
    fn mode_vector_prefix_string_respects_rank_order() {
        let mut config = ModeConfig::default();
        config.set_prefix("(ohv)@%+");
        let mut v = ModeVector::new();
        v.set('v');
        v.set('o');
        assert_eq!(v.to_prefix_string(&config), "@+");
    }
}
