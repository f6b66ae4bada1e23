// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

/// Build command.
pub mod build;
/// Dev command.
pub mod dev;
/// Sync command.
pub mod sync;
