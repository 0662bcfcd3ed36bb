//! # Element
//!
//! The pluggable behavior unit owning one atom type. Elements are stateless
//! across events except through the atoms themselves: one canonical element
//! instance serves every tile in the grid.
//!
//! Registries are built explicitly at simulation setup and injected into
//! tiles; there are no static singletons and no implicit initialization
//! order.

use tessera_core::{Atom, EVENT_WINDOW_RADIUS};

use crate::error::TileResult;
use crate::window::EventWindow;

/// Behavior owner for one atom type.
///
/// The core calls into this interface once per event; it never inspects
/// element-specific state directly.
pub trait Element: Send + Sync {
    /// The type tag this element owns. Unique within a registry.
    fn type_code(&self) -> u16;

    /// Human-readable name, for logs and statistics.
    fn name(&self) -> &str;

    /// Stable identity across runs and versions.
    fn uuid(&self) -> u64;

    /// Builds the default atom placed when this type is allocated.
    fn default_atom(&self) -> Atom {
        Atom::of_type(self.type_code())
    }

    /// How much of the window radius this element actually needs.
    ///
    /// Declaring less than the full radius lets tiles shrink the locking
    /// footprint of boundary events for simple elements.
    fn window_boundary(&self) -> u32 {
        EVENT_WINDOW_RADIUS
    }

    /// Executes one event with this element's atom at the window center.
    fn behavior(&self, window: &mut EventWindow<'_>) -> TileResult<()>;
}

/// The canonical empty element: type 0, no behavior.
#[derive(Debug, Default)]
pub struct Empty;

impl Empty {
    /// The empty element's stable identity.
    pub const UUID: u64 = 0x7E55_E2A0_0000_0000;
}

impl Element for Empty {
    fn type_code(&self) -> u16 {
        tessera_core::EMPTY_TYPE
    }

    fn name(&self) -> &str {
        "Empty"
    }

    fn uuid(&self) -> u64 {
        Self::UUID
    }

    fn behavior(&self, _window: &mut EventWindow<'_>) -> TileResult<()> {
        // Emptiness is its own reward.
        Ok(())
    }
}
