//! AWS SDK adapters for the deployment engine.
//!
//! [`AwsCloud`] owns one SDK client per service and implements every port in
//! `deploy_engine::ports`; [`AwsCloud::into_provider`] hands the engine its
//! `Provider`.

pub mod apigateway;
pub mod cloudfront;
pub mod dynamodb;
pub mod error;
pub mod iam;
pub mod lambda;
pub mod provider;
pub mod s3;
pub mod ses;
pub mod sqs;
pub mod tagging;

pub use provider::AwsCloud;
