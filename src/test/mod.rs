//! Cross-module tests: whole-pipeline scenarios and property-based suites.


#[cfg(test)]
mod property;
#[cfg(test)]
mod unit;
