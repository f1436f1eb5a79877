//! User interface rendering and input handling.
//!
//! - **surface**: render surface contract, render command queue, transcript
//! - **markup**: inline color markers produced by the escape filter
//! - **renderer**: crossterm implementation of the surface
//! - **keymapper**: keyboard events to console keys and shell bytes

pub mod keymapper;
pub mod markup;
pub mod renderer;
pub mod surface;

pub use keymapper::{Key, KeyMapper};
pub use renderer::Renderer;
pub use surface::{render_queue, Focus, RenderQueue, RenderSurface, Transcript, UiHandle};
