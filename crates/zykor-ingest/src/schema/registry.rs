//! Registry of schema descriptors keyed by `data_type`

use std::collections::BTreeMap;
use tracing::debug;

use super::{contahub, nibo, SchemaDescriptor};
use crate::error::{IngestError, Result};

#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    descriptors: BTreeMap<String, SchemaDescriptor>,
}

impl SchemaRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry holding every ContaHub and Nibo descriptor
    pub fn builtin() -> Result<Self> {
        let mut registry = Self::empty();
        for descriptor in contahub::descriptors().into_iter().chain(nibo::descriptors()) {
            registry.register(descriptor)?;
        }
        Ok(registry)
    }

    /// Validate and add a descriptor; a data type can be registered once
    pub fn register(&mut self, descriptor: SchemaDescriptor) -> Result<()> {
        descriptor.validate()?;
        if self.descriptors.contains_key(&descriptor.data_type) {
            return Err(IngestError::InvalidInput(format!(
                "data type '{}' is already registered",
                descriptor.data_type
            )));
        }
        debug!(
            data_type = %descriptor.data_type,
            table = %descriptor.table,
            fields = descriptor.fields.len(),
            "Registered schema descriptor"
        );
        self.descriptors
            .insert(descriptor.data_type.clone(), descriptor);
        Ok(())
    }

    pub fn get(&self, data_type: &str) -> Result<&SchemaDescriptor> {
        self.descriptors
            .get(data_type)
            .ok_or_else(|| IngestError::UnsupportedDataType(data_type.to_string()))
    }

    pub fn data_types(&self) -> impl Iterator<Item = &str> {
        self.descriptors.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}
