//! The hook interface a scheduler drives.

use crate::world::World;

/// A unit of per-tick logic attached to a [`World`].
///
/// Every hook is optional. The world calls `update` from
/// [`World::update`](crate::World::update) and `exit` when the system is
/// removed; `enable` and `disable` are left to whatever scheduler owns the
/// system.
pub trait System {
    /// Name used to look the system up. Defaults to the type name.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Advance by `dt` seconds.
    fn update(&mut self, _world: &mut World, _dt: f64) {}

    /// Called when a scheduler resumes the system.
    fn enable(&mut self, _world: &mut World) {}

    /// Called when a scheduler pauses the system.
    fn disable(&mut self, _world: &mut World) {}

    /// Called once when the system is removed from its world.
    fn exit(&mut self, _world: &mut World) {}
}
