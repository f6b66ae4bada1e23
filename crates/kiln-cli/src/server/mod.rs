// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Development server.

/// Static and source file lookup.
pub mod assets;
/// Request and response translation.
pub mod bridge;
/// HTTP server and request stages.
pub mod http;
/// Entry runtime process and proxy.
pub mod loader;
/// Error pages.
pub mod overlay;

pub use self::http::{create_router, create_server, DevState};
pub use loader::{ProcessEntryLoader, ProxyHandler};
