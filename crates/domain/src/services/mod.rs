//! Collaborator interfaces consumed by the messaging pipeline.
//!
//! Implementations live in the persistence crate (database-backed) and the
//! api crate (HTTP gateway); the mocks here serve development and tests.

pub mod directory;
pub mod gateway;
pub mod notification;

pub use directory::{
    substitute_variables, AudienceSource, CouponValidator, RecipientDirectory, ShopDirectory,
    TemplateSource, VariableResolver,
};
pub use gateway::{GatewayCall, GatewayError, MockSmsGateway, SendOutcome, SendUnit, SmsGateway};
pub use notification::{
    LoggingNotificationSink, NotificationResult, NotificationSink, ShopNotification,
};
