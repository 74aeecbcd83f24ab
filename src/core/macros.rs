//! Macros for the pipeline.
//!
//! Utility macros that remove the repeated validation boilerplate from
//! configuration types.

/// Macro to implement ConfigValidator with basic validation patterns.
///
/// # Example
///
/// ```rust,no_run
/// // impl_config_validator!(MyConfig {
/// //     confidence_threshold: range(0.0, 1.0),
/// //     resize_to: max(4096),
/// //     iterations: min(1),
/// // });
/// ```
#[macro_export]
macro_rules! impl_config_validator {
    ($type_name:ident { $($field:ident: $validator:ident $(($($args:tt)*))?),* $(,)? }) => {
        impl $crate::core::config::ConfigValidator for $type_name {
            fn validate(&self) -> Result<(), $crate::core::config::ConfigError> {
                $(
                    $crate::validate_field!(self, $field, $validator $(($($args)*))?);
                )*
                Ok(())
            }

            fn get_defaults() -> Self
            where
                Self: Sized,
            {
                Self::default()
            }
        }
    };
}

/// Helper macro for field validation.
#[macro_export]
macro_rules! validate_field {
    ($self:expr, $field:ident, range($min:expr, $max:expr)) => {
        if !($min..=$max).contains(&$self.$field) {
            return Err($crate::core::config::ConfigError::InvalidConfig {
                message: format!(
                    "{} must be between {} and {}",
                    stringify!($field),
                    $min,
                    $max
                ),
            });
        }
    };

    ($self:expr, $field:ident, min($min_val:expr)) => {
        if $self.$field < $min_val {
            return Err($crate::core::config::ConfigError::InvalidConfig {
                message: format!("{} must be at least {}", stringify!($field), $min_val),
            });
        }
    };

    ($self:expr, $field:ident, max($max_val:expr)) => {
        if $self.$field > $max_val {
            return Err($crate::core::config::ConfigError::InvalidConfig {
                message: format!("{} must be at most {}", stringify!($field), $max_val),
            });
        }
    };

    ($self:expr, $field:ident, path) => {
        $self.validate_model_path(&$self.$field)?;
    };
}
