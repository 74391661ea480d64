//! Publisher capability traits
//!
//! The publish flow does not know how packages are built or uploaded; it
//! talks to a boxed [`Publisher`] obtained from a [`PublisherFactory`].
//! Factories differ in which constructor shapes they accept, so creation
//! follows an ordered-attempt protocol: the orchestrator offers up to four
//! calling conventions and uses the first one the factory accepts. A
//! factory signals "not this shape" with
//! [`FactoryError::UnsupportedSignature`]; any other error aborts the
//! attempt sequence.

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

/// Errors raised while constructing a publisher
#[derive(Error, Debug)]
pub enum FactoryError {
    #[error("この呼び出し規約はサポートされていません")]
    UnsupportedSignature,

    #[error("パブリッシャーの生成に失敗しました: {message}")]
    Construction { message: String },
}

/// One constructor attempt, in the fixed protocol order
#[derive(Debug, Clone)]
pub enum ConstructorArgs {
    /// Distribution and version named explicitly, context alongside
    NamedWithContext {
        distribution: String,
        version: String,
        kwargs: Map<String, Value>,
        context: Option<Value>,
    },
    /// Everything folded into the kwargs map (`name`, `version`, and
    /// `context` merged in)
    KwargsWithContext { kwargs: Map<String, Value> },
    /// Bare distribution and version only
    Positional {
        distribution: String,
        version: String,
    },
    /// The caller kwargs as-is, nothing injected
    KwargsOnly { kwargs: Map<String, Value> },
}

/// The external publish capability
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Publish one distribution from the current working directory
    ///
    /// Paths are package-root-relative; the caller guarantees the working
    /// directory is the package root for the duration of the call. Returns
    /// whether the capability confirmed a new upload.
    async fn publish(&self, main_file: &str, ancillary: &[String]) -> anyhow::Result<bool>;
}

/// Creates publishers from one of the supported constructor shapes
pub trait PublisherFactory: Send + Sync {
    /// Stable identifier, e.g. `"twine"`
    fn identifier(&self) -> &str;

    fn try_create(&self, args: &ConstructorArgs) -> Result<Box<dyn Publisher>, FactoryError>;
}

fn merged_kwargs(
    distribution: &str,
    version: &str,
    kwargs: &Map<String, Value>,
    context: Option<&Value>,
) -> Map<String, Value> {
    let mut merged = kwargs.clone();
    merged.insert("name".to_string(), Value::String(distribution.to_string()));
    merged.insert("version".to_string(), Value::String(version.to_string()));
    if let Some(ctx) = context {
        merged.insert("context".to_string(), ctx.clone());
    }
    merged
}

/// Construct a publisher by trying the calling conventions in order
///
/// Stops at the first accepted shape. A construction failure (anything
/// other than `UnsupportedSignature`) aborts immediately; exhausting all
/// four shapes is an error.
pub fn instantiate_publisher(
    factory: &dyn PublisherFactory,
    distribution: &str,
    version: &str,
    kwargs: &Map<String, Value>,
    context: Option<&Value>,
) -> anyhow::Result<Box<dyn Publisher>> {
    let attempts = [
        ConstructorArgs::NamedWithContext {
            distribution: distribution.to_string(),
            version: version.to_string(),
            kwargs: kwargs.clone(),
            context: context.cloned(),
        },
        ConstructorArgs::KwargsWithContext {
            kwargs: merged_kwargs(distribution, version, kwargs, context),
        },
        ConstructorArgs::Positional {
            distribution: distribution.to_string(),
            version: version.to_string(),
        },
        ConstructorArgs::KwargsOnly {
            kwargs: kwargs.clone(),
        },
    ];

    for args in attempts {
        match factory.try_create(&args) {
            Ok(publisher) => return Ok(publisher),
            Err(FactoryError::UnsupportedSignature) => continue,
            Err(e) => {
                return Err(anyhow::Error::new(e).context(format!(
                    "パブリッシャー '{}' を生成できませんでした",
                    factory.identifier()
                )))
            }
        }
    }

    anyhow::bail!(
        "パブリッシャー '{}' はどの呼び出し規約も受け付けませんでした",
        factory.identifier()
    )
}
