mod support;

mod cache;
mod compiler;
mod projection;
mod properties;
