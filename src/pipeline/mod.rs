pub mod describe;
pub mod orchestrator;
pub mod refine;
pub mod render;

pub use describe::describe_scene;
pub use orchestrator::{generate, RenderResult};
pub use refine::refine_prompt;
pub use render::render_scene;
