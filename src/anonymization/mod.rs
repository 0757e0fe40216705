//! Anonymization building blocks
//!
//! Everything the job orchestrator needs to turn a sensitive record into its
//! anonymized form, plus the classifier used on the audit path.
//!
//! # Architecture
//!
//! - **Transform library** ([`transform`]): hash, generalize, suppress, noise,
//!   date shift, range and categorical primitives
//! - **Random source** ([`random`]): injected RNG for noise and date shifts
//! - **Classifier** ([`classifier`]): table/content → data categories and sensitivity
//! - **Rule generator** ([`rules`]): column list → field rules
//! - **k-anonymity** ([`kanonymity`]): extra generalization for small groups
//!
//! # Usage
//!
//! ```rust
//! use warden::adapters::database::ColumnInfo;
//! use warden::anonymization::rules::RuleGenerator;
//! use warden::config::AnonymizationConfig;
//! use warden::domain::{Algorithm, AlgorithmParams};
//!
//! let generator = RuleGenerator::from_config(&AnonymizationConfig::default());
//! let rules = generator.generate(
//!     &[ColumnInfo::new("full_name", "text"), ColumnInfo::new("id", "integer")],
//!     Algorithm::Pseudonymization,
//!     &AlgorithmParams::default(),
//! );
//! assert_eq!(rules.len(), 1);
//! ```

pub mod classifier;
pub mod kanonymity;
pub mod random;
pub mod rules;
pub mod transform;

// Re-export main types
pub use classifier::{Classification, SensitiveDataClassifier};
pub use kanonymity::KAnonymityEnforcer;
pub use random::{RandomSource, StdRandomSource};
pub use rules::RuleGenerator;
pub use transform::FieldTransformer;
