//! Global properties: typed, validated, set-once values shared by the whole run.
//!
//! A global property is declared with `define_global_property!`, optionally with a validator
//! that runs when the value is set. Model parameters are stored this way so that every module
//! reads the same validated configuration from the `Context`.
use std::any::{Any, TypeId};
use std::fs;
use std::path::Path;

use log::trace;
use serde::de::DeserializeOwned;

use crate::context::Context;
use crate::error::ContagionError;
use crate::hashing::HashMap;

/// Defines a global property with the following parameters:
/// * `$global_property`: Name for the identifier type of the global property
/// * `$value`: The type of the property's value
/// * `$validate`: A function (or closure) that checks the validity of the property (optional)
#[macro_export]
macro_rules! define_global_property {
    ($global_property:ident, $value:ty, $validate: expr) => {
        #[derive(Copy, Clone)]
        pub struct $global_property;

        impl $crate::global_properties::GlobalProperty for $global_property {
            type Value = $value;

            fn name() -> &'static str {
                stringify!($global_property)
            }

            fn validate(value: &$value) -> Result<(), $crate::error::ContagionError> {
                $validate(value)
            }
        }
    };

    ($global_property: ident, $value: ty) => {
        $crate::define_global_property!($global_property, $value, |_| { Ok(()) });
    };
}
pub use define_global_property;

pub trait GlobalProperty: Any {
    type Value: Any;

    fn name() -> &'static str;

    /// # Errors
    ///
    /// Returns the first validation failure for `value`.
    fn validate(value: &Self::Value) -> Result<(), ContagionError>;
}

#[derive(Default)]
struct GlobalPropertiesDataContainer {
    global_property_container: HashMap<TypeId, Box<dyn Any>>,
}

crate::define_data_plugin!(
    GlobalPropertiesPlugin,
    GlobalPropertiesDataContainer,
    GlobalPropertiesDataContainer::default()
);

pub trait ContextGlobalPropertiesExt {
    /// Validates and stores `value`.
    ///
    /// # Errors
    ///
    /// Returns the validator's error, or `DuplicateGlobalProperty` if the property is already set.
    fn set_global_property_value<T: GlobalProperty>(
        &mut self,
        property: T,
        value: T::Value,
    ) -> Result<(), ContagionError>;

    fn get_global_property_value<T: GlobalProperty>(&self, property: T) -> Option<&T::Value>;

    /// Reads a JSON file into `T`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or does not deserialize into `T`.
    fn load_parameters_from_json<T: DeserializeOwned>(
        &mut self,
        file_path: &Path,
    ) -> Result<T, ContagionError>;
}

impl ContextGlobalPropertiesExt for Context {
    fn set_global_property_value<T: GlobalProperty>(
        &mut self,
        _property: T,
        value: T::Value,
    ) -> Result<(), ContagionError> {
        T::validate(&value)?;
        let data_container = self.get_data_container_mut(GlobalPropertiesPlugin);
        if data_container
            .global_property_container
            .contains_key(&TypeId::of::<T>())
        {
            return Err(ContagionError::DuplicateGlobalProperty(T::name().to_string()));
        }
        trace!("setting global property {}", T::name());
        data_container
            .global_property_container
            .insert(TypeId::of::<T>(), Box::new(value));
        Ok(())
    }

    fn get_global_property_value<T: GlobalProperty>(&self, _property: T) -> Option<&T::Value> {
        self.get_data_container(GlobalPropertiesPlugin)?
            .global_property_container
            .get(&TypeId::of::<T>())
            .and_then(|value| value.downcast_ref::<T::Value>())
    }

    fn load_parameters_from_json<T: DeserializeOwned>(
        &mut self,
        file_path: &Path,
    ) -> Result<T, ContagionError> {
        trace!("loading parameters from {}", file_path.display());
        let config_file = fs::read_to_string(file_path)?;
        let parameters = serde_json::from_str(&config_file)?;
        Ok(parameters)
    }
}
