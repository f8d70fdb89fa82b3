//! # faultline-core
//!
//! The privileged half of the faultline framework: given a process and a
//! virtual address, walk the page tables down to the leaf entry, flip a
//! chosen bit of the backing frame's content, or re-point the leaf entry at
//! the frame backing a different virtual page.
//!
//! All page-table access goes through the [`AddressSpaceProvider`] trait, so
//! the same engine runs against the simulated provider used for testing and
//! demos ([`SimProvider`]) or any privileged implementation a platform may
//! supply. Frame numbers are opaque indices owned by the provider; no raw
//! pointer crosses a component boundary.

pub mod device;
pub mod error;
pub mod inject;
pub mod memory;
pub mod provider;
pub mod redirect;
pub mod sim;
pub mod translate;
pub mod util;

pub use device::{FaultCommand, FaultDevice, STATUS_OK, WIRE_LEN};
pub use error::EngineError;
pub use inject::{DEFAULT_TARGET_BIT, FaultRequest, InjectMode, inject};
pub use memory::{LinuxPageMap, LinuxPageMapError, PfnResolver, PhysAddr, VirtToPhysResolver};
pub use provider::{AddressSpaceProvider, FrameNumber, LeafEntry};
pub use redirect::{Redirection, RedirectionRequest, redirect};
pub use sim::{FlushRecord, SimProvider};
pub use translate::{Translation, translate};
