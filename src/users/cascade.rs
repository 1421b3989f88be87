use crate::core::types::{EntityId, validate_entity_id};
use crate::core::Result;
use crate::manager::DatabaseManager;
use serde_json::Value;
use tracing::{debug, info_span, Instrument};

/// What was deleted, and therefore which dependent records must go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CascadeTarget {
    /// Fields, staff, animals and assignments owned by the user.
    User(EntityId),
    /// Assignments pointing at the field.
    Field(EntityId),
    /// Assignments pointing at the staff member.
    Staff(EntityId),
    /// The animal stays, but loses its `fieldId`.
    Animal(EntityId),
}

impl CascadeTarget {
    fn kind(&self) -> &'static str {
        match self {
            Self::User(_) => "user",
            Self::Field(_) => "field",
            Self::Staff(_) => "staff",
            Self::Animal(_) => "animal",
        }
    }

    fn id(&self) -> EntityId {
        match *self {
            Self::User(id) | Self::Field(id) | Self::Staff(id) | Self::Animal(id) => id,
        }
    }
}

/// Removes or detaches everything that referenced `target`.
pub async fn cascade_delete(manager: &DatabaseManager, target: CascadeTarget) -> Result<()> {
    let id = validate_entity_id(target.id(), target.kind())?;
    let span = info_span!("cascade_delete", kind = target.kind(), id);
    async move {
        match target {
            CascadeTarget::User(_) => {
                for collection in [
                    manager.fields().await?,
                    manager.staff().await?,
                    manager.animals().await?,
                    manager.assignments().await?,
                ] {
                    collection.update_with(drop_where("userId", id)).await?;
                }
            }
            CascadeTarget::Field(_) => {
                manager
                    .assignments()
                    .await?
                    .update_with(drop_where("fieldId", id))
                    .await?;
            }
            CascadeTarget::Staff(_) => {
                manager
                    .assignments()
                    .await?
                    .update_with(drop_where("staffId", id))
                    .await?;
            }
            CascadeTarget::Animal(_) => {
                manager
                    .animals()
                    .await?
                    .update_with(move |value| match value {
                        Value::Array(items) => Value::Array(
                            items
                                .into_iter()
                                .map(|mut item| {
                                    if item.get("id").and_then(Value::as_u64) == Some(id) {
                                        if let Some(animal) = item.as_object_mut() {
                                            animal.remove("fieldId");
                                        }
                                    }
                                    item
                                })
                                .collect(),
                        ),
                        other => other,
                    })
                    .await?;
            }
        }
        debug!("cascade complete");
        Ok(())
    }
    .instrument(span)
    .await
}

/// Transformation keeping only array items whose `field` is not `id`.
fn drop_where(field: &'static str, id: EntityId) -> impl FnOnce(Value) -> Value {
    move |value| match value {
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .filter(|item| item.get(field).and_then(Value::as_u64) != Some(id))
                .collect(),
        ),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_drop_where_filters_only_matching_owner() {
        let value = json!([
            {"id": 1, "userId": 7},
            {"id": 2, "userId": 8},
            {"id": 3},
        ]);
        let kept = drop_where("userId", 7)(value);
        assert_eq!(kept, json!([{"id": 2, "userId": 8}, {"id": 3}]));
    }

    #[test]
    fn test_drop_where_leaves_objects_alone() {
        let value = json!({"accounts": []});
        assert_eq!(drop_where("userId", 1)(value.clone()), value);
    }
}
