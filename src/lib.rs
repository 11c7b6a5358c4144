//! Workspace-level tooling package (pre-commit hooks); no library code.
