//! Fuzz testing for IP allow/block list parsing.
//!
//! Entries come straight from the config file, so `CidrRange::parse` and
//! `IpRules::new` must never panic, whatever the operator typed.
//!
//! # Running the Fuzz Tests
//!
//! ```bash
//! cargo +nightly fuzz run fuzz_ip_rules
//! cargo +nightly fuzz run fuzz_ip_rules -- -max_total_time=60
//! ```

#![no_main]

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use api_skeleton::middleware::{CidrRange, IpRules};
use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
struct Input {
    allowed: Vec<String>,
    blocked: Vec<String>,
    v4: u32,
    v6: u128,
}

fuzz_target!(|input: Input| {
    for entry in input.allowed.iter().chain(&input.blocked) {
        if let Some(range) = CidrRange::parse(entry) {
            let _ = range.contains(&IpAddr::V4(Ipv4Addr::from(input.v4)));
            let _ = range.contains(&IpAddr::V6(Ipv6Addr::from(input.v6)));
        }
    }

    let rules = IpRules::new(&input.allowed, &input.blocked);
    let _ = rules.is_allowed(&IpAddr::V4(Ipv4Addr::from(input.v4)));
    let _ = rules.is_allowed(&IpAddr::V6(Ipv6Addr::from(input.v6)));
});
