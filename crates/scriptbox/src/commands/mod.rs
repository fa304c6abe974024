//! Custom command sets merged into the external engine.
//!
//! Each set registers named operations following the engine's calling
//! convention (operation name plus ordered string arguments). The names
//! are namespaced (`expect:*`) so they cannot shadow engine built-ins.

pub mod expect;

use std::sync::Arc;

use crate::engine::CmdRegistry;
use crate::error::Result;
use crate::snapshot::SnapshotCmd;

/// Register every command set this crate provides.
pub fn register_all(registry: &mut CmdRegistry) -> Result<()> {
    register_expect(registry)?;
    register_snapshot(registry)?;
    Ok(())
}

/// Register the interactive-session commands
/// (`expect:spawn`, `expect:send`, `expect:expect`, `expect:interact`,
/// `expect:close`).
pub fn register_expect(registry: &mut CmdRegistry) -> Result<()> {
    registry.register("expect:spawn", Arc::new(expect::SpawnCmd))?;
    registry.register("expect:send", Arc::new(expect::SendCmd))?;
    registry.register("expect:expect", Arc::new(expect::ExpectCmd))?;
    registry.register("expect:interact", Arc::new(expect::InteractCmd))?;
    registry.register("expect:close", Arc::new(expect::CloseCmd))?;
    Ok(())
}

/// Register the `snapshot` command.
pub fn register_snapshot(registry: &mut CmdRegistry) -> Result<()> {
    registry.register("snapshot", Arc::new(SnapshotCmd))
}
