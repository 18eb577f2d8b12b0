mod block;
mod compare;
mod loops;
mod renderer;

pub mod expr;
pub mod program;

pub use renderer::Renderer;
