#![allow(clippy::zero_prefixed_literal)]

use crate::cap;
use crate::utils;
use crate::{Cmd, Event, ServerInfo};
use libtiny_common::modes::parse_mode_string;
use libtiny_common::{CaseMapping, ChanName, ChanNameRef, ModeClass, ModeConfig, ModeVector};
use libtiny_wire as wire;
use libtiny_wire::{Msg, Pfx};

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use futures::{select, FutureExt, StreamExt};
use tokio::sync::mpsc::{Receiver, Sender};

/// Initial reconnect delay. Doubled after every failed attempt (capped at
/// `RECONNECT_BACKOFF_MAX`), reset to this on successful registration (001).
const RECONNECT_BACKOFF_BASE: u64 = 4;
const RECONNECT_BACKOFF_FACTOR: u64 = 2;
const RECONNECT_BACKOFF_MAX: u64 = 86400;

#[derive(Clone)]
pub struct State {
    inner: Rc<RefCell<StateInner>>,
}

impl State {
    pub(crate) fn new(server_info: ServerInfo) -> State {
        State {
            inner: Rc::new(RefCell::new(StateInner::new(server_info))),
        }
    }

    pub(crate) fn reset(&self) {
        self.inner.borrow_mut().reset()
    }

    pub(crate) fn update(
        &self,
        msg: &mut Msg,
        snd_ev: &mut Sender<Event>,
        snd_irc_msg: &mut Sender<String>,
    ) {
        self.inner.borrow_mut().update(msg, snd_ev, snd_irc_msg);
    }

    pub(crate) fn introduce(&self, snd_irc_msg: &mut Sender<String>) {
        self.inner.borrow_mut().introduce(snd_irc_msg)
    }

    /// Next delay to wait before reconnecting, per the exponential backoff
    /// schedule. Advances the internal attempt counter.
    pub(crate) fn next_backoff(&self) -> Duration {
        self.inner.borrow_mut().next_backoff()
    }

    // FIXME: This allocates a new String
    pub(crate) fn get_nick(&self) -> String {
        self.inner.borrow().current_nick.clone()
    }

    // FIXME: Maybe use RwLock instead of Mutex
    pub(crate) fn is_nick_accepted(&self) -> bool {
        self.inner.borrow().nick_accepted
    }

    pub(crate) fn get_usermask(&self) -> Option<String> {
        self.inner.borrow().usermask.clone()
    }

    pub(crate) fn set_away(&self, msg: Option<&str>) {
        self.inner.borrow_mut().away_status = msg.map(str::to_owned);
    }

    pub(crate) fn get_chan_nicks(&self, chan: &ChanNameRef) -> Vec<String> {
        self.inner.borrow().get_chan_nicks(chan)
    }

    /// Channels the given nick is currently known to be a member of.
    /// `ACCOUNT`/`AWAY`/`CHGHOST` messages don't carry a channel list of
    /// their own (unlike `QUIT`/`NICK`, which `libtiny_client` fills in as
    /// it applies them), so callers that need to show an informational
    /// line in every channel the user shares with us look it up here.
    pub(crate) fn get_nick_chans(&self, nick: &str) -> Vec<ChanName> {
        self.inner.borrow().get_nick_chans(nick)
    }

    pub(crate) fn get_mode_config(&self) -> ModeConfig {
        self.inner.borrow().mode_cfg.clone()
    }

    pub(crate) fn get_usermodes_string(&self) -> String {
        self.inner.borrow().usermodes.to_alphabetical_string()
    }

    pub(crate) fn get_chan_modes_string(&self, chan: &ChanNameRef) -> String {
        self.inner.borrow().get_chan_modes_string(chan)
    }

    pub(crate) fn get_chan_nick_prefix(&self, chan: &ChanNameRef, nick: &str) -> String {
        self.inner.borrow().get_chan_nick_prefix(chan, nick)
    }

    pub(crate) fn leave_channel(&self, msg_chan: &mut Sender<Cmd>, chan: &ChanNameRef) {
        self.inner.borrow_mut().leave_channel(msg_chan, chan)
    }

    pub(crate) fn kill_join_tasks(&self) {
        self.inner.borrow_mut().kill_join_tasks();
    }
}

struct StateInner {
    /// Nicks to try, in this order.
    nicks: Vec<String>,

    /// NickServ password
    nickserv_ident: Option<String>,

    /// An index to `nicks`. Once we run out we fall back to a random nick
    /// (see `random_fallback_nick`).
    current_nick_idx: usize,

    /// A cache of current nick, to avoid allocating new nicks when inventing new ones.
    current_nick: String,

    /// Currently joined channels. Every channel we join will be added here to be able to re-join
    /// automatically on reconnect and channels we leave will be removed.
    ///
    /// This would be a `HashMap<String, ..>` but we want to join channels in the order the user
    /// specified, so using a `Vec`.
    chans: Vec<Chan>,

    /// Away reason if away mode is on. `None` otherwise.
    away_status: Option<String>,

    /// servername to be used in PING messages. Read from 002 RPL_YOURHOST. `None` until 002.
    servername: Option<String>,

    /// Our usermask given by the server. Currently only parsed after a JOIN, reply 396.
    ///
    /// Note that RPL_USERHOST (302) does not take cloaks into account, so we don't parse USERHOST
    /// responses to set this field.
    usermask: Option<String>,

    /// Do we have a nick yet? Try another nick on ERR_NICKNAMEINUSE (433) until we've got a nick.
    nick_accepted: bool,

    /// Server information
    server_info: ServerInfo,

    /// Case mapping currently in effect, per numeric 005's `CASEMAPPING`
    /// token. `rfc1459` until that arrives.
    casemapping: CaseMapping,

    /// CHANMODES/PREFIX/MODES from numeric 005, plus the user modes token
    /// from numeric 004.
    mode_cfg: ModeConfig,

    /// Our own user modes (`+i`, `+w`, ...).
    usermodes: ModeVector,

    /// `CAP`/SASL negotiation state for the current connection.
    cap_state: cap::CapState,

    /// Number of consecutive failed (re)connect attempts since the last
    /// successful registration. Drives `next_backoff`.
    backoff_attempt: u32,
}

#[derive(Debug)]
struct Chan {
    /// Name of the channel
    name: ChanName,
    /// Nicks in the channel, with their per-user prefix modes (op, voice, ...).
    nicks: Vec<(String, ModeVector)>,
    /// Channel-wide flag/argument modes (CHANMODES classes B/C/D). List
    /// modes (class A, e.g. bans) aren't tracked here: there's no single
    /// "is set" bit for a list.
    modes: ModeVector,
    /// Channel joined state
    join_state: JoinState,
    /// Join attempts
    join_attempts: u8,
    /// The channel-secrecy symbol (`@`/`*`/`=`) from the most recent
    /// RPL_NAMREPLY, if any has been seen yet.
    names_prefix: Option<char>,
}

/// State transitions:
///    NotJoined -> Joining: When we get 477 for the channel
///    NotJoined -> Joined: When we get a JOIN message for the channel on first attempt
///    Joining -> Joined: When we get a JOIN message for the channel
///    Joining -> NotJoined: Connection reset
///    Joined -> NotJoined: Connection reset
///    Joined -> Joining: Unexpected/Invalid state
#[derive(Debug)]
enum JoinState {
    /// Initial state for Chan
    NotJoined,
    /// In the process of joining the channel
    Joining {
        /// Sender to kill the retry task if tab is closed
        stop_task: Sender<()>,
    },
    /// Successfully joined the channel
    Joined,
}

const MAX_JOIN_RETRIES: u8 = 3;

impl Chan {
    fn new(name: ChanName) -> Chan {
        Chan {
            name,
            nicks: Vec::new(),
            modes: ModeVector::new(),
            join_state: JoinState::NotJoined,
            join_attempts: MAX_JOIN_RETRIES,
            names_prefix: None,
        }
    }

    fn reset(&mut self) {
        self.nicks.clear();
        self.modes = ModeVector::new();
        self.join_state = JoinState::NotJoined;
        self.join_attempts = MAX_JOIN_RETRIES;
        self.names_prefix = None;
    }

    fn set_joining(&mut self, stop_task: Sender<()>) {
        self.join_state = JoinState::Joining { stop_task }
    }

    /// Uses a retry.
    /// Returns number of retries left or None.
    fn retry_join(&mut self) -> Option<u8> {
        match self.join_attempts {
            0 => None,
            _ => {
                self.join_attempts -= 1;
                Some(self.join_attempts)
            }
        }
    }

    fn find_nick_idx(&self, nick: &str, casemapping: CaseMapping) -> Option<usize> {
        utils::find_idx(&self.nicks, |(n, _)| casemapping.eq(n, nick))
    }

    fn insert_nick(&mut self, nick: String, casemapping: CaseMapping) {
        if self.find_nick_idx(&nick, casemapping).is_none() {
            self.nicks.push((nick, ModeVector::new()));
        }
    }

    fn remove_nick(&mut self, nick: &str, casemapping: CaseMapping) -> bool {
        match self.find_nick_idx(nick, casemapping) {
            Some(idx) => {
                self.nicks.remove(idx);
                true
            }
            None => false,
        }
    }

    fn rename_nick(&mut self, old: &str, new: &str, casemapping: CaseMapping) -> bool {
        match self.find_nick_idx(old, casemapping) {
            Some(idx) => {
                self.nicks[idx].0 = new.to_owned();
                true
            }
            None => false,
        }
    }
}

impl StateInner {
    fn new(server_info: ServerInfo) -> StateInner {
        let current_nick = server_info.nicks[0].to_owned();
        let chans = server_info
            .auto_join
            .iter()
            .map(|s| Chan::new(s.to_owned()))
            .collect();
        StateInner {
            nicks: server_info.nicks.clone(),
            nickserv_ident: server_info.nickserv_ident.clone(),
            current_nick_idx: 0,
            current_nick,
            chans,
            away_status: None,
            servername: None,
            usermask: None,
            nick_accepted: false,
            casemapping: CaseMapping::default(),
            mode_cfg: ModeConfig::default(),
            usermodes: ModeVector::new(),
            cap_state: cap::CapState::default(),
            backoff_attempt: 0,
            server_info,
        }
    }

    fn reset(&mut self) {
        self.nick_accepted = false;
        self.nicks = self.server_info.nicks.clone();
        self.current_nick_idx = 0;
        self.current_nick = self.nicks[0].clone();
        // Only reset the values here; the key set will be used to join channels
        for chan in &mut self.chans {
            chan.reset();
        }
        self.servername = None;
        self.usermask = None;
        self.casemapping = CaseMapping::default();
        self.mode_cfg = ModeConfig::default();
        self.usermodes = ModeVector::new();
        self.cap_state = cap::CapState::default();
    }

    fn next_backoff(&mut self) -> Duration {
        // 2^attempt overflows long before the result would matter; cap the
        // exponent itself rather than the (already `.min`-capped) result.
        let attempt = self.backoff_attempt.min(20);
        let secs = RECONNECT_BACKOFF_BASE
            .saturating_mul(RECONNECT_BACKOFF_FACTOR.saturating_pow(attempt))
            .min(RECONNECT_BACKOFF_MAX);
        self.backoff_attempt = self.backoff_attempt.saturating_add(1);
        Duration::from_secs(secs)
    }

    fn introduce(&mut self, snd_irc_msg: &mut Sender<String>) {
        if let Some(ref pass) = self.server_info.pass {
            snd_irc_msg.try_send(wire::pass(pass)).unwrap();
        }
        snd_irc_msg
            .try_send(wire::nick(&self.current_nick))
            .unwrap();
        snd_irc_msg
            .try_send(wire::user(&self.nicks[0], &self.server_info.realname))
            .unwrap();
    }

    fn get_next_nick(&mut self) -> &str {
        self.current_nick_idx += 1;
        if self.current_nick_idx >= self.nicks.len() {
            self.current_nick = random_fallback_nick();
        } else {
            self.current_nick = self.nicks[self.current_nick_idx].clone();
        }
        &self.current_nick
    }

    fn handle_cap_ls(
        &mut self,
        is_continuation: bool,
        params: &[String],
        snd_irc_msg: &mut Sender<String>,
    ) {
        match &mut self.cap_state {
            cap::CapState::LsPending { caps } => caps.extend(params.iter().cloned()),
            _ => self.cap_state = cap::CapState::LsPending { caps: params.to_vec() },
        }

        if is_continuation {
            return;
        }

        let caps = match std::mem::replace(&mut self.cap_state, cap::CapState::Idle) {
            cap::CapState::LsPending { caps } => caps,
            other => {
                // Shouldn't happen (we just set LsPending above), but don't lose state.
                self.cap_state = other;
                return;
            }
        };

        // Tokens may carry a value (e.g. `sasl=PLAIN,EXTERNAL`); only the
        // cap name matters for `select_caps`.
        let names: Vec<String> = caps
            .iter()
            .map(|c| c.split('=').next().unwrap_or(c).to_owned())
            .collect();
        let sasl_configured = self.server_info.sasl_auth.is_some();
        let requested = cap::select_caps(&names, sasl_configured);

        if requested.is_empty() {
            snd_irc_msg.try_send(wire::cap_end()).unwrap();
            self.cap_state = cap::CapState::Done;
        } else {
            let req_refs: Vec<&str> = requested.iter().map(String::as_str).collect();
            snd_irc_msg.try_send(wire::cap_req(&req_refs)).unwrap();
            self.cap_state = cap::CapState::ReqSent { requested };
        }
    }

    fn handle_cap_ack(&mut self, params: &[String], snd_irc_msg: &mut Sender<String>) {
        if !matches!(self.cap_state, cap::CapState::ReqSent { .. }) {
            return;
        }

        let mechanism = match &self.server_info.sasl_auth {
            Some(crate::SASLAuth::Plain { .. }) => Some(cap::SaslMechanism::Plain),
            Some(crate::SASLAuth::External(_)) => Some(cap::SaslMechanism::External),
            None => None,
        };

        if params.iter().any(|c| c == "sasl") && mechanism.is_some() {
            let mechanism = mechanism.unwrap();
            snd_irc_msg
                .try_send(wire::authenticate(mechanism.as_str()))
                .unwrap();
            self.cap_state = cap::CapState::Authenticating { mechanism };
        } else {
            snd_irc_msg.try_send(wire::cap_end()).unwrap();
            self.cap_state = cap::CapState::Done;
        }
    }

    /// Strip (possibly stacked, with `multi-prefix`) leading `PREFIX`
    /// characters off a NAMES token, returning the bare nick and the
    /// modes those characters represent.
    fn parse_names_token(&self, token: &str) -> (String, ModeVector) {
        let mut mv = ModeVector::new();
        let mut rest = token;
        while let Some(c) = rest.chars().next() {
            match self.mode_cfg.prefix.iter().find(|&&(_, p)| p == c) {
                Some(&(mode, _)) => {
                    mv.set(mode);
                    rest = &rest[c.len_utf8()..];
                }
                None => break,
            }
        }
        (rest.to_owned(), mv)
    }

    fn update(
        &mut self,
        msg: &mut Msg,
        snd_ev: &mut Sender<Event>,
        snd_irc_msg: &mut Sender<String>,
    ) {
        let Msg {
            ref pfx,
            ref mut cmd,
        } = msg;

        use wire::Cmd::*;
        match cmd {
            // PING: Send PONG
            PING { server } => {
                snd_irc_msg.try_send(wire::pong(server)).unwrap();
            }

            // JOIN: If this is us then update usermask if possible, create the channel state. If
            // someone else add the nick to channel.
            JOIN { chan, .. } => {
                match pfx {
                    Some(Pfx::User { nick, user }) if self.casemapping.eq(nick, &self.current_nick) => {
                        let usermask = format!("{}!{}", nick, user);
                        self.usermask = Some(usermask);
                    }
                    _ => {}
                }

                match pfx {
                    Some(Pfx::User { nick, .. }) | Some(Pfx::Ambiguous(nick)) => {
                        if self.casemapping.eq(nick, &self.current_nick) {
                            // We joined a channel, initialize channel state
                            match utils::find_idx(&self.chans, |c| &c.name == chan) {
                                None => {
                                    let mut new_chan = Chan::new(chan.to_owned());
                                    // Since nick was found in the prefix, we are in the channel
                                    new_chan.join_state = JoinState::Joined;
                                    self.chans.push(new_chan);
                                }
                                Some(chan_idx) => {
                                    // This happens because we initialize channel states for channels
                                    // that we will join on connection when the client is first created
                                    let chan = &mut self.chans[chan_idx];
                                    chan.join_state = JoinState::Joined;
                                    chan.nicks.clear();
                                }
                            }
                        } else {
                            let nick = wire::drop_nick_prefix(nick).to_owned();
                            let casemapping = self.casemapping;
                            match utils::find_idx(&self.chans, |c| &c.name == chan) {
                                Some(chan_idx) => {
                                    self.chans[chan_idx].insert_nick(nick, casemapping);
                                }
                                None => {
                                    debug!("Can't find channel state for JOIN: {:?}", cmd);
                                }
                            }
                        }
                    }
                    Some(Pfx::Server(_)) | None => {}
                }
            }

            // PART: If this is us remove the channel state. Otherwise remove the nick from the
            // channel.
            PART { chan, .. } => match pfx {
                Some(Pfx::User { nick, .. }) | Some(Pfx::Ambiguous(nick)) => {
                    if self.casemapping.eq(nick, &self.current_nick) {
                        match utils::find_idx(&self.chans, |c| &c.name == chan) {
                            None => {
                                debug!("Can't find channel state: {}", chan.display());
                            }
                            Some(chan_idx) => {
                                self.chans.remove(chan_idx);
                            }
                        }
                    } else {
                        let casemapping = self.casemapping;
                        match utils::find_idx(&self.chans, |c| &c.name == chan) {
                            Some(chan_idx) => {
                                self.chans[chan_idx]
                                    .remove_nick(wire::drop_nick_prefix(nick), casemapping);
                            }
                            None => {
                                debug!("Can't find channel state for PART: {:?}", cmd);
                            }
                        }
                    }
                }
                Some(Pfx::Server(_)) | None => {}
            },

            // QUIT: Update the `chans` field for the channels that the user was in
            QUIT { ref mut chans, .. } => {
                let nick = match pfx {
                    Some(Pfx::User { nick, .. }) | Some(Pfx::Ambiguous(nick)) => nick,
                    Some(Pfx::Server(_)) | None => {
                        return;
                    }
                };
                let casemapping = self.casemapping;
                for chan in self.chans.iter_mut() {
                    if chan.remove_nick(nick, casemapping) {
                        chans.push(chan.name.to_owned());
                    }
                }
            }

            // MODE: Either a usermode update addressed to us, or a channel mode update.
            MODE {
                target,
                modestring,
                args,
            } => {
                if self.casemapping.eq(target, &self.current_nick) {
                    // Usermode changes never take arguments, unlike channel
                    // modes, so there's no CHANMODES/PREFIX bucket to
                    // consult here; just walk the sign-prefixed flag list.
                    let mut sign = true;
                    for c in modestring.chars() {
                        match c {
                            '+' => sign = true,
                            '-' => sign = false,
                            flag => {
                                if sign {
                                    self.usermodes.set(flag);
                                } else {
                                    self.usermodes.clear(flag);
                                }
                            }
                        }
                    }
                } else {
                    let target_ref = ChanNameRef::new(target);
                    let casemapping = self.casemapping;
                    if let Some(chan_idx) =
                        utils::find_idx(&self.chans, |c| c.name.eq_under(target_ref, casemapping))
                    {
                        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
                        let (changes, errors) =
                            parse_mode_string(&self.mode_cfg, modestring, arg_refs.iter());
                        for err in errors {
                            debug!("mode parse error on {}: {}", target, err);
                        }
                        let mode_cfg = &self.mode_cfg;
                        let chan = &mut self.chans[chan_idx];
                        for change in changes {
                            match mode_cfg.classify(change.flag) {
                                Some(ModeClass::Prefix) => {
                                    if let Some(nick) = &change.arg {
                                        if let Some(nick_idx) =
                                            chan.find_nick_idx(nick, casemapping)
                                        {
                                            let mv = &mut chan.nicks[nick_idx].1;
                                            if change.sign {
                                                mv.set(change.flag);
                                            } else {
                                                mv.clear(change.flag);
                                            }
                                        }
                                    }
                                }
                                // List modes (bans etc.): no persistent "is set" bit to flip.
                                Some(ModeClass::A) | None => {}
                                Some(ModeClass::B) | Some(ModeClass::C) | Some(ModeClass::D) => {
                                    if change.sign {
                                        chan.modes.set(change.flag);
                                    } else {
                                        chan.modes.clear(change.flag);
                                    }
                                }
                            }
                        }
                    }
                }
            }

            // KICK: RFC 2812 section 3.2.8 -- a comment equal to the kicker's own nick is the
            // server's auto-generated default reason, so we fold it to "no reason given".
            KICK {
                chan,
                nick,
                comment,
            } => {
                let kicker = match pfx {
                    Some(Pfx::User { nick, .. }) | Some(Pfx::Ambiguous(nick)) => Some(nick.as_str()),
                    Some(Pfx::Server(_)) | None => None,
                };
                if let Some(kicker) = kicker {
                    if comment.as_deref().map_or(false, |c| self.casemapping.eq(c, kicker)) {
                        *comment = None;
                    }
                }
                let casemapping = self.casemapping;
                if let Some(chan_idx) = utils::find_idx(&self.chans, |c| &c.name == chan) {
                    if casemapping.eq(nick, &self.current_nick) {
                        self.chans.remove(chan_idx);
                    } else {
                        self.chans[chan_idx].remove_nick(nick, casemapping);
                    }
                }
            }

            // 396: Try to set usermask.
            Reply { num: 396, params } => {
                // :hobana.freenode.net 396 osa1 haskell/developer/osa1
                // :is now your hidden host (set by services.)
                if params.len() == 3 {
                    let usermask =
                        format!("{}!~{}@{}", self.current_nick, self.nicks[0], params[1]);
                    self.usermask = Some(usermask);
                }
            }

            // Reply 477 when user needs to be identified with NickServ to join a channel
            // ex. Reply { num: 477, params: ["<your_nick>", "<channel name>", "<Server reply message>"] }
            Reply { num: 477, params } => {
                // Only try to automatically rejoin if nickserv_ident is configured
                if let (Some(channel), Some(msg_477)) = (params.get(1), params.get(2)) {
                    let channel = ChanNameRef::new(channel);
                    snd_ev
                        .try_send(Event::Msg(wire::Msg {
                            pfx: pfx.clone(),
                            cmd: wire::Cmd::PRIVMSG {
                                ctcp: None,
                                is_notice: true,
                                msg: msg_477.clone(),
                                target: wire::MsgTarget::Chan(channel.to_owned()),
                            },
                        }))
                        .unwrap();
                    // Get channel name from params
                    if self.nickserv_ident.is_some() {
                        // Helper for creating an event
                        let create_message = |msg: String| Event::ChannelJoinError {
                            chan: channel.to_owned(),
                            msg,
                        };
                        // Find channel in self.chans
                        if let Some(idx) = utils::find_idx(&self.chans, |c| c.name == *channel) {
                            let chan = &mut self.chans[idx];
                            // Retry joining channel if retries are available
                            if let Some(retries) = chan.retry_join() {
                                let retry_msg = format!(
                                    "Attempting to rejoin {} in 10 seconds... ({}/{})",
                                    channel.display(),
                                    MAX_JOIN_RETRIES - retries,
                                    MAX_JOIN_RETRIES
                                );
                                snd_ev.try_send(create_message(retry_msg)).unwrap();
                                let snd_irc_msg = snd_irc_msg.clone();
                                // Spawn task and delay rejoin to give NickServ time to identify nick
                                let (snd_abort, rcv_abort) = tokio::sync::mpsc::channel(1);
                                match &mut chan.join_state {
                                    JoinState::NotJoined => chan.set_joining(snd_abort),
                                    JoinState::Joining { stop_task, .. } => *stop_task = snd_abort,
                                    JoinState::Joined => {
                                        error!("Unexpected JoinState for channel.");
                                        return;
                                    }
                                }
                                tokio::task::spawn_local(retry_channel_join(
                                    channel.to_owned(),
                                    snd_irc_msg,
                                    rcv_abort,
                                ));
                            } else {
                                // No more retries
                                let no_retries_msg =
                                    format!("Unable to join {}.", channel.display());
                                snd_ev.try_send(create_message(no_retries_msg)).unwrap();
                            }
                        } else {
                            warn!("Could not find channel in server state channel list.");
                        }
                    } else {
                        debug!("Received 477 reply but nickserv_ident is not configured.");
                    }
                } else {
                    warn!("Could not parse 477 reply: {:?}", cmd);
                }
            }

            // 302: Try to set usermask.
            Reply { num: 302, params } => {
                // 302 RPL_USERHOST
                // :ircd.stealth.net 302 yournick :syrk=+syrk@millennium.stealth.net
                //
                // We know there will be only one nick because /userhost cmd sends
                // one parameter (our nick)
                //
                // Example args: ["osa1", "osa1=+omer@moz-s8a.9ac.93.91.IP "]

                let param = &params[1];
                match param.find('=') {
                    None => {
                        warn!("Could not parse 302 RPL_USERHOST to set usermask.");
                    }
                    Some(mut i) => {
                        if param.as_bytes().get(i + 1) == Some(&b'+')
                            || param.as_bytes().get(i + 1) == Some(&b'-')
                        {
                            i += 1;
                        }
                        let usermask = (&param[i..]).trim();
                        self.usermask = Some(usermask.to_owned());
                    }
                }
            }

            // RPL_WELCOME: Start introduction sequence and NickServ authentication.
            Reply { num: 001, .. } => {
                snd_ev.try_send(Event::Connected).unwrap();
                snd_ev
                    .try_send(Event::NickChange {
                        new_nick: self.current_nick.clone(),
                    })
                    .unwrap();
                self.nick_accepted = true;
                self.backoff_attempt = 0;
                if let Some(ref pwd) = self.nickserv_ident {
                    snd_irc_msg
                        .try_send(wire::privmsg("NickServ", &format!("identify {}", pwd)))
                        .unwrap();
                }
            }

            // RPL_YOURHOST: Set servername
            Reply { num: 002, params } => {
                // 002    RPL_YOURHOST
                //        "Your host is <servername>, running version <ver>"

                // An example <servername>: cherryh.freenode.net[149.56.134.238/8001]

                match parse_servername(pfx.as_ref(), params) {
                    None => {
                        error!("Could not parse server name in 002 RPL_YOURHOST message.");
                    }
                    Some(servername) => {
                        self.servername = Some(servername);
                    }
                }
            }

            // RPL_MYINFO: user modes available on this server.
            Reply { num: 004, params } => {
                // <nick> <server_name> <version> <user_modes> <chan_modes> [...]
                if let Some(user_modes) = params.get(3) {
                    self.mode_cfg.user_modes = user_modes.clone();
                }
            }

            // RPL_ISUPPORT: CASEMAPPING/CHANMODES/PREFIX/MODES, among other tokens we don't
            // act on. CHANMODES here takes priority over 004's chan-modes field, since nearly
            // every modern ircd sends it and it's the more precise of the two.
            Reply { num: 005, params } => {
                for token in params.iter().skip(1) {
                    if let Some((key, value)) = token.split_once('=') {
                        match key {
                            "CASEMAPPING" => {
                                if let Some(cm) = CaseMapping::parse(value) {
                                    self.casemapping = cm;
                                    self.mode_cfg.casemapping = cm;
                                }
                            }
                            "CHANMODES" => self.mode_cfg.set_chanmodes(value),
                            "PREFIX" => self.mode_cfg.set_prefix(value),
                            "MODES" => self.mode_cfg.set_modes_limit(value),
                            _ => {}
                        }
                    }
                }
            }

            // ERR_NICKNAMEINUSE: Try another nick if we don't have a nick yet.
            Reply { num: 433, .. } => {
                if !self.nick_accepted {
                    let new_nick = self.get_next_nick();
                    snd_ev
                        .try_send(Event::NickChange {
                            new_nick: new_nick.to_owned(),
                        })
                        .unwrap();
                    snd_irc_msg.try_send(wire::nick(new_nick)).unwrap();
                }
            }

            // NICK message sent from the server when our nick change request was successful
            NICK {
                nick: new_nick,
                ref mut chans,
            } => {
                match pfx {
                    Some(Pfx::User { nick: old_nick, .. }) | Some(Pfx::Ambiguous(old_nick)) => {
                        if self.casemapping.eq(old_nick, &self.current_nick) {
                            snd_ev
                                .try_send(Event::NickChange {
                                    new_nick: new_nick.to_owned(),
                                })
                                .unwrap();

                            match utils::find_idx(&self.nicks, |nick| nick == new_nick) {
                                None => {
                                    self.nicks.push(new_nick.to_owned());
                                    self.current_nick_idx = self.nicks.len() - 1;
                                }
                                Some(nick_idx) => {
                                    self.current_nick_idx = nick_idx;
                                }
                            }

                            self.current_nick = new_nick.to_owned();

                            if let Some(ref pwd) = self.nickserv_ident {
                                snd_irc_msg
                                    .try_send(wire::privmsg(
                                        "NickServ",
                                        &format!("identify {}", pwd),
                                    ))
                                    .unwrap();
                            }
                        }

                        // Rename the nick in channel states, also populate the chan list
                        let casemapping = self.casemapping;
                        for chan in &mut self.chans {
                            if chan.rename_nick(old_nick, new_nick, casemapping) {
                                chans.push(chan.name.to_owned());
                            }
                        }
                    }
                    Some(Pfx::Server(_)) | None => {}
                }
            }

            // RPL_ENDOFMOTD: Join channels, set away status
            Reply { num: 376, .. } => {
                let chans: Vec<&ChanNameRef> = self.chans.iter().map(|c| c.name.as_ref()).collect();
                if !chans.is_empty() {
                    snd_irc_msg.try_send(wire::join(chans.into_iter())).unwrap();
                }
                if self.away_status.is_some() {
                    snd_irc_msg
                        .try_send(wire::away(self.away_status.as_deref()))
                        .unwrap();
                }
            }

            // RPL_NAMREPLY: Set users (and their prefix modes) in a channel.
            // `params[1]` is the channel-secrecy symbol (`@` secret, `*`
            // private, `=` public); anything else is logged and the line is
            // dropped, matching the original's `*prefix != '@' && ... ->
            // failf`.
            Reply { num: 353, params } => {
                if params.len() < 4 {
                    warn!("Could not parse 353 RPL_NAMREPLY: {:?}", params);
                    return;
                }
                let mut symbol_chars = params[1].chars();
                let symbol = match (symbol_chars.next(), symbol_chars.next()) {
                    (Some(c @ ('@' | '*' | '=')), None) => c,
                    _ => {
                        warn!("RPL_NAMREPLY: invalid channel type: {:?}", params[1]);
                        return;
                    }
                };

                let chan_ref = ChanNameRef::new(&params[2]);
                let casemapping = self.casemapping;
                let chan_idx =
                    match utils::find_idx(&self.chans, |c| c.name.eq_under(chan_ref, casemapping)) {
                        None => {
                            self.chans.push(Chan::new(chan_ref.to_owned()));
                            self.chans.len() - 1
                        }
                        Some(idx) => idx,
                    };

                let chan = &mut self.chans[chan_idx];
                chan.names_prefix = Some(symbol);
                match symbol {
                    '@' => chan.modes.set('s'),
                    '*' => chan.modes.set('p'),
                    _ => {}
                }

                for token in params[3].split_whitespace() {
                    let (nick, mv) = self.parse_names_token(token);
                    match self.chans[chan_idx].find_nick_idx(&nick, casemapping) {
                        Some(nick_idx) => self.chans[chan_idx].nicks[nick_idx].1 = mv,
                        None => self.chans[chan_idx].nicks.push((nick, mv)),
                    }
                }
            }

            // CAP negotiation (IRCv3). See `crate::cap` for the capabilities we ask for and
            // the SASL payload encoding.
            CAP {
                client: _,
                subcommand,
                is_continuation,
                params,
            } => match subcommand.as_str() {
                "LS" => self.handle_cap_ls(*is_continuation, params, snd_irc_msg),
                "ACK" => self.handle_cap_ack(params, snd_irc_msg),
                "NAK" => {
                    snd_irc_msg.try_send(wire::cap_end()).unwrap();
                    self.cap_state = cap::CapState::Done;
                }
                _ => {}
            },

            AUTHENTICATE { param } => {
                if param == "+" {
                    if let cap::CapState::Authenticating { mechanism } = self.cap_state {
                        if let Some(ref auth) = self.server_info.sasl_auth {
                            let encoded = match (mechanism, auth) {
                                (
                                    cap::SaslMechanism::Plain,
                                    crate::SASLAuth::Plain { username, password },
                                ) => cap::encode_plain(username, password),
                                (cap::SaslMechanism::External, crate::SASLAuth::External(_)) => {
                                    cap::encode_external()
                                }
                                // Mechanism was picked from `sasl_auth` itself in
                                // `handle_cap_ack`, so these combinations don't arise.
                                _ => cap::encode_external(),
                            };
                            for chunk in cap::chunk_response(&encoded) {
                                let payload = if chunk.is_empty() { "+" } else { chunk };
                                snd_irc_msg.try_send(wire::authenticate(payload)).unwrap();
                            }
                        }
                    }
                }
            }

            // 900: RPL_LOGGEDIN, 903: RPL_SASLSUCCESS. Either ends the SASL
            // exchange successfully; `CAP END` resumes registration.
            Reply { num: 900 | 903, .. } => {
                if matches!(self.cap_state, cap::CapState::Authenticating { .. }) {
                    snd_irc_msg.try_send(wire::cap_end()).unwrap();
                    self.cap_state = cap::CapState::Done;
                }
            }

            // 902: ERR_NICKLOCKED, 904: ERR_SASLFAIL, 905: ERR_SASLTOOLONG,
            // 906: ERR_SASLABORTED, 907: ERR_SASLALREADY, 908: ERR_SASLMECHS.
            // All terminal: surface the failure and resume registration by
            // sending `CAP END` anyway (the server won't retry SASL for us).
            Reply {
                num: num @ (902 | 904 | 905 | 906 | 907 | 908),
                params,
            } => {
                if matches!(self.cap_state, cap::CapState::Authenticating { .. }) {
                    let reason = params.last().cloned().unwrap_or_default();
                    snd_ev
                        .try_send(Event::WireError(format!(
                            "SASL authentication failed ({}): {}",
                            num, reason
                        )))
                        .unwrap();
                    snd_irc_msg.try_send(wire::cap_end()).unwrap();
                    self.cap_state = cap::CapState::Done;
                }
            }

            // Ignore the rest
            _ => {}
        }
    }

    fn get_chan_nicks(&self, chan: &ChanNameRef) -> Vec<String> {
        match utils::find_idx(&self.chans, |c| c.name.eq_under(chan, self.casemapping)) {
            None => {
                error!("Could not find channel index in get_chan_nicks.");
                vec![]
            }
            Some(chan_idx) => {
                let mut nicks = self.chans[chan_idx]
                    .nicks
                    .iter()
                    .map(|(nick, _)| nick.clone())
                    .collect::<Vec<String>>();
                nicks.sort_unstable_by(|a, b| {
                    a.to_lowercase().partial_cmp(&b.to_lowercase()).unwrap()
                });
                nicks
            }
        }
    }

    fn get_nick_chans(&self, nick: &str) -> Vec<ChanName> {
        self.chans
            .iter()
            .filter(|c| c.find_nick_idx(nick, self.casemapping).is_some())
            .map(|c| c.name.to_owned())
            .collect()
    }

    fn get_chan_modes_string(&self, chan: &ChanNameRef) -> String {
        match utils::find_idx(&self.chans, |c| c.name.eq_under(chan, self.casemapping)) {
            None => String::new(),
            Some(idx) => self.chans[idx].modes.to_alphabetical_string(),
        }
    }

    fn get_chan_nick_prefix(&self, chan: &ChanNameRef, nick: &str) -> String {
        match utils::find_idx(&self.chans, |c| c.name.eq_under(chan, self.casemapping)) {
            None => String::new(),
            Some(idx) => match self.chans[idx].find_nick_idx(nick, self.casemapping) {
                None => String::new(),
                Some(nick_idx) => self.chans[idx].nicks[nick_idx].1.to_prefix_string(&self.mode_cfg),
            },
        }
    }

    /// If channel is in Joining state cancel Joining task, otherwise sent part message
    fn leave_channel(&mut self, msg_chan: &mut Sender<Cmd>, chan: &ChanNameRef) {
        if let Some(idx) = utils::find_idx(&self.chans, |c| c.name == *chan) {
            match &mut self.chans[idx].join_state {
                JoinState::NotJoined => {}
                JoinState::Joining { stop_task, .. } => {
                    debug!("Aborting task to retry joining {}", chan.display());
                    let _ = stop_task.try_send(());
                }
                JoinState::Joined => msg_chan.try_send(Cmd::Msg(wire::part(chan))).unwrap(),
            }
        }
    }

    /// Kills all tasks that are trying to join channels
    fn kill_join_tasks(&mut self) {
        for chan in &mut self.chans {
            if let JoinState::Joining { stop_task } = &mut chan.join_state {
                let _ = stop_task.try_send(());
            }
        }
    }
}

/// Once configured nicks are exhausted, fall back to `rirc` followed by 5
/// random hex digits (RFC 2812 section 1.2.1 allows up to 9-byte nicks on
/// most networks).
fn random_fallback_nick() -> String {
    use rand::Rng;
    const HEX: &[u8; 16] = b"0123456789ABCDEF";
    let mut rng = rand::thread_rng();
    let mut nick = String::from("rirc");
    for _ in 0..5 {
        nick.push(HEX[rng.gen_range(0..HEX.len())] as char);
    }
    nick
}

async fn retry_channel_join(
    channel: ChanName,
    snd_irc_msg: Sender<String>,
    rcv_abort: Receiver<()>,
) {
    debug!("Attempting to re-join channel {}", channel.display());

    use tokio::time::{sleep, Duration};

    let mut delay = sleep(Duration::from_secs(10)).fuse();
    let mut rcv_abort = rcv_abort.fuse();

    select! {
        () = delay => {
            // Send join message
            snd_irc_msg.try_send(wire::join(std::iter::once(channel.as_ref()))).unwrap();
        },
        _ = rcv_abort.next() => {
            // Channel tab was closed
        },
    };
}

const SERVERNAME_PREFIX: &str = "Your host is ";
const SERVERNAME_PREFIX_LEN: usize = SERVERNAME_PREFIX.len();

/// Parse server name from RPL_YOURHOST reply or fallback to using the server name inside
/// Pfx::Server. See https://www.irc.com/dev/docs/refs/numerics/002.html for more info.
fn parse_servername(pfx: Option<&Pfx>, params: &[String]) -> Option<String> {
    parse_yourhost_msg(params).or_else(|| parse_server_pfx(pfx))
}

/// Try to parse servername in a 002 RPL_YOURHOST reply params.
fn parse_yourhost_msg(params: &[String]) -> Option<String> {
    let msg = params.get(1).or_else(|| params.get(0))?;
    if msg.len() >= SERVERNAME_PREFIX_LEN && &msg[..SERVERNAME_PREFIX_LEN] == SERVERNAME_PREFIX {
        let slice1 = &msg[SERVERNAME_PREFIX_LEN..];
        let servername_ends = slice1.find('[').or_else(|| slice1.find(','))?;
        Some((&slice1[..servername_ends]).to_owned())
    } else {
        None
    }
}

/// Get the server name from a prefix.
fn parse_server_pfx(pfx: Option<&Pfx>) -> Option<String> {
    match pfx {
        Some(Pfx::Server(server_name)) | Some(Pfx::Ambiguous(server_name)) => {
            Some(server_name.to_owned())
        }
        Some(Pfx::User { .. }) | None => None,
    }
}

////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_servername_1() {
        // IRC standard
        let prefix = Some(Pfx::Server("card.freenode.net".to_string()));
        let params = vec![
            "nickname".to_string(),
            "Your host is card.freenode.net[38.229.70.22/6697], running version ircd-seven-1.1.9"
                .to_string(),
        ];
        assert_eq!(
            parse_servername(prefix.as_ref(), &params),
            Some("card.freenode.net".to_owned())
        );

        let prefix = Some(Pfx::Server("coulomb.oftc.net".to_string()));
        let params = vec![
            "nickname".to_string(),
            "Your host is coulomb.oftc.net[109.74.200.93/6697], running version hybrid-7.2.2+oftc1.7.3".to_string(),
        ];
        assert_eq!(
            parse_servername(prefix.as_ref(), &params),
            Some("coulomb.oftc.net".to_owned())
        );

        let prefix = Some(Pfx::Server("irc.eagle.y.se".to_string()));
        let params = vec![
            "nickname".to_string(),
            "Your host is irc.eagle.y.se, running version UnrealIRCd-4.0.18".to_string(),
        ];
        assert_eq!(
            parse_servername(prefix.as_ref(), &params),
            Some("irc.eagle.y.se".to_owned())
        );
    }

    #[test]
    fn test_parse_servername_2() {
        // Gitter variation
        // Msg { pfx: Some(Server("irc.gitter.im")), cmd: Reply { num: 2, params: ["nickname", " 1.10.0"] } }
        let prefix = Some(Pfx::Server("irc.gitter.im".to_string()));
        let params = vec!["nickname".to_string(), " 1.10.0".to_string()];
        assert_eq!(
            parse_servername(prefix.as_ref(), &params),
            Some("irc.gitter.im".to_owned())
        );
    }

    fn test_server_info() -> ServerInfo {
        ServerInfo {
            addr: "irc.example.com".to_owned(),
            port: 6667,
            tls: false,
            pass: None,
            realname: "tester".to_owned(),
            nicks: vec!["tester".to_owned()],
            auto_join: vec![],
            nickserv_ident: None,
            sasl_auth: None,
        }
    }

    #[test]
    fn mode_update_tracks_channel_and_prefix_modes() {
        let mut state = StateInner::new(test_server_info());
        state.mode_cfg.set_chanmodes("b,k,l,imnpst");
        state.chans.push(Chan::new(ChanName::new("#chan".to_owned())));
        state.chans[0].insert_nick("alice".to_owned(), state.casemapping);

        let (mut snd_ev, _rcv_ev) = tokio::sync::mpsc::channel(8);
        let (mut snd_irc_msg, _rcv_irc_msg) = tokio::sync::mpsc::channel(8);

        let mut msg = Msg {
            pfx: Some(Pfx::Server("irc.example.com".to_owned())),
            cmd: wire::Cmd::MODE {
                target: "#chan".to_owned(),
                modestring: "+o".to_owned(),
                args: vec!["alice".to_owned()],
            },
        };
        state.update(&mut msg, &mut snd_ev, &mut snd_irc_msg);

        assert_eq!(
            state.get_chan_nick_prefix(ChanNameRef::new("#chan"), "alice"),
            "@"
        );
    }

    #[test]
    fn kick_with_comment_equal_to_kicker_nick_is_suppressed() {
        let mut state = StateInner::new(test_server_info());
        state.chans.push(Chan::new(ChanName::new("#chan".to_owned())));
        state.chans[0].insert_nick("bob".to_owned(), state.casemapping);

        let (mut snd_ev, _rcv_ev) = tokio::sync::mpsc::channel(8);
        let (mut snd_irc_msg, _rcv_irc_msg) = tokio::sync::mpsc::channel(8);

        let mut msg = Msg {
            pfx: Some(Pfx::User {
                nick: "alice".to_owned(),
                user: "a@b".to_owned(),
            }),
            cmd: wire::Cmd::KICK {
                chan: ChanName::new("#chan".to_owned()),
                nick: "bob".to_owned(),
                comment: Some("alice".to_owned()),
            },
        };
        state.update(&mut msg, &mut snd_ev, &mut snd_irc_msg);

        match msg.cmd {
            wire::Cmd::KICK { ref comment, .. } => assert_eq!(*comment, None),
            _ => panic!("expected KICK"),
        }
        assert_eq!(state.get_chan_nicks(ChanNameRef::new("#chan")), Vec::<String>::new());
    }

    #[test]
    fn namreply_stores_channel_secrecy_symbol_and_nicks() {
        let mut state = StateInner::new(test_server_info());

        let (mut snd_ev, _rcv_ev) = tokio::sync::mpsc::channel(8);
        let (mut snd_irc_msg, _rcv_irc_msg) = tokio::sync::mpsc::channel(8);

        let mut msg = Msg {
            pfx: Some(Pfx::Server("irc.example.com".to_owned())),
            cmd: wire::Cmd::Reply {
                num: 353,
                params: vec![
                    "tester".to_owned(),
                    "=".to_owned(),
                    "#chan".to_owned(),
                    "@op +voice alice".to_owned(),
                ],
            },
        };
        state.update(&mut msg, &mut snd_ev, &mut snd_irc_msg);

        let idx = utils::find_idx(&state.chans, |c| c.name == ChanName::new("#chan".to_owned()))
            .unwrap();
        assert_eq!(state.chans[idx].names_prefix, Some('='));
        assert_eq!(
            state.get_chan_nick_prefix(ChanNameRef::new("#chan"), "op"),
            "@"
        );
        assert_eq!(
            state.get_chan_nick_prefix(ChanNameRef::new("#chan"), "voice"),
            "+"
        );
        assert_eq!(
            state.get_chan_nick_prefix(ChanNameRef::new("#chan"), "alice"),
            ""
        );
    }

    #[test]
    fn namreply_with_unknown_symbol_is_dropped() {
        let mut state = StateInner::new(test_server_info());

        let (mut snd_ev, _rcv_ev) = tokio::sync::mpsc::channel(8);
        let (mut snd_irc_msg, _rcv_irc_msg) = tokio::sync::mpsc::channel(8);

        let mut msg = Msg {
            pfx: Some(Pfx::Server("irc.example.com".to_owned())),
            cmd: wire::Cmd::Reply {
                num: 353,
                params: vec![
                    "tester".to_owned(),
                    "?".to_owned(),
                    "#chan".to_owned(),
                    "alice".to_owned(),
                ],
            },
        };
        state.update(&mut msg, &mut snd_ev, &mut snd_irc_msg);

        assert!(utils::find_idx(&state.chans, |c| c.name == ChanName::new("#chan".to_owned()))
            .is_none());
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let mut state = StateInner::new(test_server_info());
        assert_eq!(state.next_backoff(), Duration::from_secs(4));
        assert_eq!(state.next_backoff(), Duration::from_secs(8));
        assert_eq!(state.next_backoff(), Duration::from_secs(16));
        state.backoff_attempt = 30;
        assert_eq!(state.next_backoff(), Duration::from_secs(RECONNECT_BACKOFF_MAX));
    }
}
