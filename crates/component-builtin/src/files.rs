//! The file loader.

use std::sync::Arc;

use async_trait::async_trait;
use cascade_core::FileId;
use cascade_component::{
    Category, ComponentDefinition, ComponentError, ComponentHandler, ComponentOutcome,
    ConnectionType, ExecutionContext, ObjectSchema, PortDecl, Primitive, ProgressUpdate,
};
use serde_json::Value;

struct FileLoaderHandler;

#[async_trait]
impl ComponentHandler for FileLoaderHandler {
    async fn execute(
        &self,
        _input: Value,
        params: Value,
        ctx: &ExecutionContext,
    ) -> Result<ComponentOutcome, ComponentError> {
        let file_id = params
            .get("fileId")
            .and_then(Value::as_str)
            .ok_or_else(|| ComponentError::validation("fileId parameter is required"))?;
        let file_id = FileId::parse(file_id)
            .map_err(|_| ComponentError::validation(format!("not a file id: {file_id}")))?;

        let storage = ctx.storage()?;
        let file = storage
            .download(file_id)
            .await?
            .ok_or_else(|| ComponentError::validation(format!("file not found: {file_id}")))?;

        ctx.emit_progress(ProgressUpdate::info(format!(
            "loaded {} ({} bytes)",
            file.name,
            file.content.len()
        )));

        Ok(ComponentOutcome::completed(serde_json::json!({
            "fileName": file.name,
            "size": file.content.len(),
            "mimeType": file.mime_type,
            "content": String::from_utf8_lossy(&file.content),
        })))
    }
}

/// Loads a stored file and exposes its name, size, and content.
#[must_use]
pub fn file_loader() -> ComponentDefinition {
    ComponentDefinition::new(
        "file.loader",
        "File Loader",
        Category::Utility,
        Arc::new(FileLoaderHandler),
    )
    .with_inputs(
        ObjectSchema::new()
            .with(PortDecl::action("payload", "Payload", ConnectionType::Any).optional()),
    )
    .with_parameters(ObjectSchema::new().with(
        PortDecl::config("fileId", "File", ConnectionType::primitive(Primitive::File))
            .with_description("id of the stored file to load"),
    ))
    .with_outputs(
        ObjectSchema::new()
            .with(PortDecl::action(
                "fileName",
                "File Name",
                ConnectionType::primitive(Primitive::Text),
            ))
            .with(PortDecl::action(
                "size",
                "Size",
                ConnectionType::primitive(Primitive::Number),
            ))
            .with(PortDecl::action(
                "content",
                "Content",
                ConnectionType::primitive(Primitive::Text),
            )),
    )
}
