mod control;
mod memory;
mod validation;
