// SPDX-License-Identifier: MIT

//! Discovery layer (§4.I, §4.J): turns proxy router configuration and
//! container label state into `HOSTNAMES_DISCOVERED` events consumed by the
//! reconciliation engine.

pub mod container_monitor;
pub mod proxy_monitor;
