//! Virtual memory options read from the kernel command line.
//!
//! Options are `key=value` tokens separated by whitespace. Tokens this module
//! does not know belong to other subsystems and are skipped.

use crate::mem::frame_allocator::MAX_FRAMES;
use alloc::string::String;
use core::error::Error;
use core::fmt::{Debug, Display, Formatter};
use kidneyos_shared::sizes::KB;
use nom::branch::alt;
use nom::bytes::complete::{tag, take_while1};
use nom::character::complete::{char, digit1};
use nom::combinator::{all_consuming, map_opt, map_res, value, verify};
use nom::sequence::terminated;
use nom::IResult;

/// Number of user frames when `frames=` is not given.
pub const DEFAULT_USER_FRAMES: usize = 256;
/// Stack growth limit in KiB when `stack=` is not given.
pub const DEFAULT_STACK_KIB: usize = 1024;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PlacementKind {
    NextFit,
    FirstFit,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum EvictionKind {
    Fifo,
    Clock,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VmConfig {
    /// Block device to swap to. The first swap device if `None`.
    pub swap_device: Option<String>,
    pub user_frames: usize,
    pub placement: PlacementKind,
    pub eviction: EvictionKind,
    /// Size in bytes of the region below the user stack top that faults may
    /// grow the stack into.
    pub stack_limit: usize,
}

impl Default for VmConfig {
    fn default() -> Self {
        VmConfig {
            swap_device: None,
            user_frames: DEFAULT_USER_FRAMES,
            placement: PlacementKind::NextFit,
            eviction: EvictionKind::Clock,
            stack_limit: DEFAULT_STACK_KIB * KB,
        }
    }
}

/// Error type for command line parsing
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// A known option was given a value it does not accept
    InvalidValue(&'static str),
}

impl Debug for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        match self {
            ConfigError::InvalidValue(key) => write!(f, "InvalidValue({:?})", key),
        }
    }
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        match self {
            ConfigError::InvalidValue(key) => write!(f, "invalid value for `{}`", key),
        }
    }
}

impl Error for ConfigError {}

/// The `key` of a `key=value` token.
fn key(token: &str) -> IResult<&str, &str> {
    terminated(take_while1(|c: char| c.is_ascii_lowercase()), char('='))(token)
}

fn number(input: &str) -> IResult<&str, usize> {
    map_res(digit1, str::parse::<usize>)(input)
}

fn placement(input: &str) -> IResult<&str, PlacementKind> {
    alt((
        value(PlacementKind::NextFit, tag("next-fit")),
        value(PlacementKind::FirstFit, tag("first-fit")),
    ))(input)
}

fn eviction(input: &str) -> IResult<&str, EvictionKind> {
    alt((
        value(EvictionKind::Fifo, tag("fifo")),
        value(EvictionKind::Clock, tag("clock")),
    ))(input)
}

fn frames(input: &str) -> IResult<&str, usize> {
    verify(number, |n: &usize| (1..=MAX_FRAMES).contains(n))(input)
}

fn stack_kib(input: &str) -> IResult<&str, usize> {
    map_opt(number, |kib| kib.checked_mul(KB))(input)
}

/// Runs `parser` over the whole of `arg`.
fn parse_arg<'a, O>(
    parser: impl FnMut(&'a str) -> IResult<&'a str, O>,
    arg: &'a str,
    key: &'static str,
) -> Result<O, ConfigError> {
    all_consuming(parser)(arg)
        .map(|(_, value)| value)
        .map_err(|_| ConfigError::InvalidValue(key))
}

impl VmConfig {
    pub fn parse(cmdline: &str) -> Result<Self, ConfigError> {
        let mut config = VmConfig::default();

        for token in cmdline.split_whitespace() {
            let Ok((arg, name)) = key(token) else {
                continue;
            };

            match name {
                "swap" => {
                    if arg.is_empty() {
                        return Err(ConfigError::InvalidValue("swap"));
                    }
                    config.swap_device = Some(String::from(arg));
                }
                "frames" => config.user_frames = parse_arg(frames, arg, "frames")?,
                "placement" => config.placement = parse_arg(placement, arg, "placement")?,
                "evict" => config.eviction = parse_arg(eviction, arg, "evict")?,
                "stack" => config.stack_limit = parse_arg(stack_kib, arg, "stack")?,
                _ => {}
            }
        }

        Ok(config)
    }
}
