mod common;
mod projector;
