//! Table creation from a record's schema, for tests and bootstrapping.

use aws_sdk_dynamodb::operation::create_table::{
    CreateTableError, CreateTableInput, CreateTableOutput,
};
use aws_sdk_dynamodb::types::{
    AttributeDefinition, KeySchemaElement, KeyType, ProvisionedThroughput,
};
use tracing::debug;

use crate::error::Error;
use crate::mapper::{Mapper, observe};
use crate::schema::{KeyAttribute, Record};

fn key_definition(
    key: &KeyAttribute,
    key_type: KeyType,
) -> Result<(KeySchemaElement, AttributeDefinition), Error> {
    let scalar = key.kind.scalar_type().ok_or_else(|| {
        Error::Request(format!(
            "key attribute \"{}\" of kind {} cannot define a table",
            key.name,
            key.kind.type_token()
        ))
    })?;
    Ok((
        KeySchemaElement::builder()
            .attribute_name(&key.name)
            .key_type(key_type)
            .build()?,
        AttributeDefinition::builder()
            .attribute_name(&key.name)
            .attribute_type(scalar)
            .build()?,
    ))
}

/// CreateTable input for the mapper's table, keyed like the record's schema
pub fn table_input<T: Record>(mapper: &Mapper<T>) -> Result<CreateTableInput, Error> {
    let schema = mapper.schema();
    let (hash_schema, hash_definition) = key_definition(schema.hash_key(), KeyType::Hash)?;

    let mut builder = CreateTableInput::builder()
        .table_name(mapper.table_name())
        .key_schema(hash_schema)
        .attribute_definitions(hash_definition)
        .provisioned_throughput(
            ProvisionedThroughput::builder()
                .read_capacity_units(10)
                .write_capacity_units(10)
                .build()?,
        );

    if let Some(sort_key) = schema.sort_key() {
        let (sort_schema, sort_definition) = key_definition(sort_key, KeyType::Range)?;
        builder = builder
            .key_schema(sort_schema)
            .attribute_definitions(sort_definition);
    }

    Ok(builder.build()?)
}

/// Create the mapper's table; an existing table is not an error
pub async fn table<T: Record>(mapper: &Mapper<T>) -> Result<CreateTableOutput, Error> {
    let input = table_input(mapper)?;
    let table = input.table_name.clone();

    let result = mapper
        .client()
        .create_table()
        .set_table_name(input.table_name)
        .set_key_schema(input.key_schema)
        .set_attribute_definitions(input.attribute_definitions)
        .set_provisioned_throughput(input.provisioned_throughput)
        .send()
        .await;

    match result {
        Err(e) if matches!(e.as_service_error(), Some(CreateTableError::ResourceInUseException(_))) => {
            debug!(table = ?table, "table already exists");
            Ok(CreateTableOutput::builder().build())
        }
        result => observe("CreateTable", table.as_deref(), result.map_err(Error::from)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::AttributeKind;
    use crate::mapper::tests::{Note, offline_client, orders};
    use aws_sdk_dynamodb::types::ScalarAttributeType;

    #[test]
    fn test_table_input_from_schema() {
        let input = table_input(&orders()).unwrap();
        assert_eq!(input.table_name.as_deref(), Some("orders"));

        let key_schema = input.key_schema.unwrap();
        assert_eq!(key_schema.len(), 2);
        assert_eq!(key_schema[0].attribute_name, "customer");
        assert_eq!(key_schema[0].key_type, KeyType::Hash);
        assert_eq!(key_schema[1].attribute_name, "id");
        assert_eq!(key_schema[1].key_type, KeyType::Range);

        let definitions = input.attribute_definitions.unwrap();
        assert!(
            definitions
                .iter()
                .all(|d| d.attribute_type == ScalarAttributeType::S)
        );
    }

    #[test]
    fn test_table_input_honours_override() {
        let mapper = Mapper::<Note>::new(offline_client())
            .unwrap()
            .with_table_name("notes-it");
        let input = table_input(&mapper).unwrap();
        assert_eq!(input.table_name.as_deref(), Some("notes-it"));
        assert_eq!(input.key_schema.unwrap().len(), 1);
    }

    #[test]
    fn test_key_definition_rejects_non_scalar() {
        let key = KeyAttribute::new("flags", AttributeKind::Bool);
        assert!(matches!(
            key_definition(&key, KeyType::Hash),
            Err(Error::Request(_))
        ));
    }
}
