use async_trait::async_trait;
use aws_sdk_dynamodb::types::{
    AttributeDefinition, BillingMode as SdkBillingMode, KeySchemaElement, KeyType,
    ProvisionedThroughput, ScalarAttributeType, StreamSpecification, StreamViewType, Tag,
    TableDescription,
};
use deploy_core::handler::{AttributeType, BillingMode, KeyAttribute, StreamView};
use deploy_core::resources::table::{TableLive, TableSpec, TableStatus};
use deploy_core::tags::Tags;
use deploy_engine::ports::{ProviderResult, TableApi};

use crate::error::{absent, classify, invalid_request, missing_field};
use crate::provider::AwsCloud;

/// Capacity applied when a table is switched to provisioned billing.
const PROVISIONED_UNITS: i64 = 5;

fn attribute_type(value: &ScalarAttributeType) -> AttributeType {
    match value {
        ScalarAttributeType::N => AttributeType::N,
        ScalarAttributeType::B => AttributeType::B,
        _ => AttributeType::S,
    }
}

fn key_attribute(table: &TableDescription, key_type: KeyType) -> Option<KeyAttribute> {
    let name = table
        .key_schema()
        .iter()
        .find(|element| element.key_type() == &key_type)?
        .attribute_name();
    let attribute_type = table
        .attribute_definitions()
        .iter()
        .find(|definition| definition.attribute_name() == name)
        .map_or(AttributeType::S, |definition| {
            attribute_type(definition.attribute_type())
        });
    Some(KeyAttribute {
        name: name.to_string(),
        attribute_type,
    })
}

fn table_live(table: &TableDescription, tags: Tags) -> ProviderResult<TableLive> {
    let partition_key = key_attribute(table, KeyType::Hash)
        .ok_or_else(|| missing_field("DescribeTable", "KeySchema HASH"))?;
    let billing_mode = match table
        .billing_mode_summary()
        .and_then(|summary| summary.billing_mode())
    {
        Some(SdkBillingMode::Provisioned) => BillingMode::Provisioned,
        Some(_) => BillingMode::PayPerRequest,
        // Tables created before on-demand billing existed report no summary.
        None => BillingMode::Provisioned,
    };
    let stream = table
        .stream_specification()
        .filter(|spec| spec.stream_enabled())
        .and_then(|spec| spec.stream_view_type())
        .and_then(|view| StreamView::parse(view.as_str()));

    Ok(TableLive {
        name: table.table_name().unwrap_or_default().to_string(),
        arn: table.table_arn().unwrap_or_default().to_string(),
        status: table
            .table_status()
            .map_or(TableStatus::Other, |status| TableStatus::parse(status.as_str())),
        partition_key,
        sort_key: key_attribute(table, KeyType::Range),
        billing_mode,
        stream_arn: stream.and(table.latest_stream_arn().map(ToString::to_string)),
        stream,
        tags,
    })
}

fn key_element(attribute: &KeyAttribute, key_type: KeyType) -> ProviderResult<KeySchemaElement> {
    KeySchemaElement::builder()
        .attribute_name(&attribute.name)
        .key_type(key_type)
        .build()
        .map_err(|error| invalid_request("CreateTable", error))
}

fn attribute_definition(attribute: &KeyAttribute) -> ProviderResult<AttributeDefinition> {
    AttributeDefinition::builder()
        .attribute_name(&attribute.name)
        .attribute_type(ScalarAttributeType::from(attribute.attribute_type.as_str()))
        .build()
        .map_err(|error| invalid_request("CreateTable", error))
}

fn stream_specification(view: Option<StreamView>) -> ProviderResult<StreamSpecification> {
    StreamSpecification::builder()
        .stream_enabled(view.is_some())
        .set_stream_view_type(view.map(|view| StreamViewType::from(view.as_str())))
        .build()
        .map_err(|error| invalid_request("UpdateTable", error))
}

fn provisioned_throughput() -> ProviderResult<ProvisionedThroughput> {
    ProvisionedThroughput::builder()
        .read_capacity_units(PROVISIONED_UNITS)
        .write_capacity_units(PROVISIONED_UNITS)
        .build()
        .map_err(|error| invalid_request("UpdateTable", error))
}

fn dynamodb_tags(tags: &Tags) -> ProviderResult<Vec<Tag>> {
    tags.iter()
        .map(|(key, value)| {
            Tag::builder()
                .key(key)
                .value(value)
                .build()
                .map_err(|error| invalid_request("TagResource", error))
        })
        .collect()
}

impl AwsCloud {
    async fn table_tags(&self, arn: &str) -> ProviderResult<Tags> {
        let mut tags = Tags::new();
        let mut next: Option<String> = None;
        loop {
            let output = self
                .dynamodb
                .list_tags_of_resource()
                .resource_arn(arn)
                .set_next_token(next.take())
                .send()
                .await
                .map_err(|error| classify("ListTagsOfResource", error))?;
            tags.extend(
                output
                    .tags()
                    .iter()
                    .map(|tag| (tag.key().to_string(), tag.value().to_string())),
            );
            match output.next_token() {
                Some(token) => next = Some(token.to_string()),
                None => break,
            }
        }
        Ok(tags)
    }
}

#[async_trait]
impl TableApi for AwsCloud {
    async fn describe_table(&self, name: &str) -> ProviderResult<Option<TableLive>> {
        let output = match self.dynamodb.describe_table().table_name(name).send().await {
            Ok(output) => output,
            Err(error) => return absent("DescribeTable", error),
        };
        let Some(table) = output.table() else {
            return Err(missing_field("DescribeTable", "Table"));
        };
        let tags = match table.table_arn() {
            Some(arn) => self.table_tags(arn).await?,
            None => Tags::new(),
        };
        table_live(table, tags).map(Some)
    }

    async fn create_table(
        &self,
        name: &str,
        spec: &TableSpec,
        tags: &Tags,
    ) -> ProviderResult<TableLive> {
        let mut key_schema = vec![key_element(&spec.partition_key, KeyType::Hash)?];
        let mut definitions = vec![attribute_definition(&spec.partition_key)?];
        if let Some(sort) = &spec.sort_key {
            key_schema.push(key_element(sort, KeyType::Range)?);
            definitions.push(attribute_definition(sort)?);
        }

        let mut request = self
            .dynamodb
            .create_table()
            .table_name(name)
            .set_key_schema(Some(key_schema))
            .set_attribute_definitions(Some(definitions))
            .billing_mode(SdkBillingMode::from(spec.billing_mode.as_str()))
            .set_tags(Some(dynamodb_tags(tags)?));
        if spec.billing_mode == BillingMode::Provisioned {
            request = request.provisioned_throughput(provisioned_throughput()?);
        }
        if spec.stream.is_some() {
            request = request.stream_specification(stream_specification(spec.stream)?);
        }
        let output = request
            .send()
            .await
            .map_err(|error| classify("CreateTable", error))?;
        let table = output
            .table_description()
            .ok_or_else(|| missing_field("CreateTable", "TableDescription"))?;
        table_live(table, tags.clone())
    }

    async fn update_billing_mode(&self, name: &str, mode: BillingMode) -> ProviderResult<()> {
        let mut request = self
            .dynamodb
            .update_table()
            .table_name(name)
            .billing_mode(SdkBillingMode::from(mode.as_str()));
        if mode == BillingMode::Provisioned {
            request = request.provisioned_throughput(provisioned_throughput()?);
        }
        request
            .send()
            .await
            .map_err(|error| classify("UpdateTable", error))?;
        Ok(())
    }

    async fn update_stream(&self, name: &str, view: Option<StreamView>) -> ProviderResult<()> {
        self.dynamodb
            .update_table()
            .table_name(name)
            .stream_specification(stream_specification(view)?)
            .send()
            .await
            .map_err(|error| classify("UpdateTable", error))?;
        Ok(())
    }

    async fn tag_table(&self, arn: &str, tags: &Tags) -> ProviderResult<()> {
        self.dynamodb
            .tag_resource()
            .resource_arn(arn)
            .set_tags(Some(dynamodb_tags(tags)?))
            .send()
            .await
            .map_err(|error| classify("TagResource", error))?;
        Ok(())
    }

    async fn delete_table(&self, name: &str) -> ProviderResult<()> {
        self.dynamodb
            .delete_table()
            .table_name(name)
            .send()
            .await
            .map_err(|error| classify("DeleteTable", error))?;
        Ok(())
    }
}
