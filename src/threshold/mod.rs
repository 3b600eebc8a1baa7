// Threshold resolution for probabilistic tests
//
// A test declares *how* its pass threshold should be obtained; this module turns
// that declaration into a concrete (samples, threshold) pair before the first
// trial runs. Four styles are supported:
//
// - explicit:         samples and minimum pass rate given directly
// - baseline:         sample-size-first; threshold derived from a prior
//                     large-sample measurement via its Wilson lower bound
// - power:            confidence-first; sample size from a power analysis
// - threshold_first:  samples and threshold given, implied confidence reported
//
// Resolution is a pure function of its inputs. All validation happens here so a
// misconfigured test fails with a ConfigError and zero trial invocations.

mod mode;
mod resolver;
mod spec;

pub use mode::{BaselineReference, ThresholdMode};
pub use resolver::resolve;
pub use spec::{ThresholdOrigin, ThresholdSpecification, DEFAULT_REPORTING_CONFIDENCE};

#[cfg(test)]
mod tests;
