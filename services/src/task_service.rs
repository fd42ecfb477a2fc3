use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};
use tx_core::{
    error::{CoreError, Result},
    models::{NewTask, Task, TaskDependency, TaskFilter, TaskStats, TaskStatus, TaskWithDeps, UpdateTask},
    repository::{TaskDependencyRepository, TaskRepository},
};

/// Maximum depth walked when collecting descendants for a cascading delete,
/// matching the ancestor-walk cap used for cycle detection on `update`.
const MAX_RECURSION_DEPTH: usize = 1000;

/// Orchestrates the task graph: CRUD, dependency-enriched reads, cascading
/// delete, and ancestor auto-completion. Holds only repository trait
/// objects so it can be exercised against the `mocks` crate's in-memory
/// fakes without a database.
#[derive(Clone)]
pub struct TaskService {
    tasks: Arc<dyn TaskRepository>,
    dependencies: Arc<dyn TaskDependencyRepository>,
}

impl TaskService {
    pub fn new(tasks: Arc<dyn TaskRepository>, dependencies: Arc<dyn TaskDependencyRepository>) -> Self {
        Self { tasks, dependencies }
    }

    #[instrument(skip(self, input))]
    pub async fn create(&self, input: NewTask) -> Result<Task> {
        if let Some(parent_id) = &input.parent_id {
            if self.tasks.get_by_id(parent_id).await?.is_none() {
                return Err(CoreError::not_found_id(parent_id));
            }
        }
        let task = self.tasks.create(input).await?;
        info!(task_id = %task.id, "created task");
        Ok(task)
    }

    pub async fn get(&self, id: &str) -> Result<Option<Task>> {
        self.tasks.get_by_id(id).await
    }

    pub async fn get_with_deps(&self, id: &str) -> Result<Option<TaskWithDeps>> {
        let Some(task) = self.tasks.get_by_id(id).await? else {
            return Ok(None);
        };
        let mut batch = self.get_with_deps_batch(&[id.to_string()]).await?;
        Ok(Some(batch.remove(id).unwrap_or_else(|| enrich(task))))
    }

    /// Assembles `TaskWithDeps` for every id in one dependency snapshot,
    /// one children-of-many lookup, and the batch's own `Task` rows —
    /// a small fixed number of queries regardless of `ids.len()` (§8
    /// invariant 13).
    #[instrument(skip(self, ids), fields(count = ids.len()))]
    pub async fn get_with_deps_batch(&self, ids: &[String]) -> Result<HashMap<String, TaskWithDeps>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let snapshot = self.dependencies.snapshot_for(ids).await?;
        let mut blocked_by: HashMap<String, Vec<String>> = HashMap::new();
        let mut blocks: HashMap<String, Vec<String>> = HashMap::new();
        for (blocked_id, blocker_id) in &snapshot {
            blocked_by.entry(blocked_id.clone()).or_default().push(blocker_id.clone());
            blocks.entry(blocker_id.clone()).or_default().push(blocked_id.clone());
        }

        let children = self.tasks.list_children_of_many(ids).await?;
        let mut children_by_parent: HashMap<String, Vec<Task>> = HashMap::new();
        for child in children {
            if let Some(parent_id) = &child.parent_id {
                children_by_parent.entry(parent_id.clone()).or_default().push(child);
            }
        }

        let blocker_ids: HashSet<String> = snapshot.iter().map(|(_, blocker)| blocker.clone()).collect();
        let blocker_statuses = if blocker_ids.is_empty() {
            HashMap::new()
        } else {
            let ids: Vec<String> = blocker_ids.into_iter().collect();
            let mut statuses = HashMap::new();
            for id in &ids {
                if let Some(t) = self.tasks.get_by_id(id).await? {
                    statuses.insert(id.clone(), t.status);
                }
            }
            statuses
        };

        let mut result = HashMap::new();
        for id in ids {
            let Some(task) = self.tasks.get_by_id(id).await? else {
                continue;
            };
            let task_blocked_by = blocked_by.remove(id).unwrap_or_default();
            let task_blocks = blocks.remove(id).unwrap_or_default();
            let task_children = children_by_parent
                .remove(id)
                .unwrap_or_default()
                .into_iter()
                .map(|c| c.id)
                .collect::<Vec<_>>();
            let is_ready = task.status.is_workable()
                && task_blocked_by
                    .iter()
                    .all(|b| blocker_statuses.get(b) == Some(&TaskStatus::Done));
            result.insert(
                id.clone(),
                TaskWithDeps {
                    task,
                    blocked_by: task_blocked_by,
                    blocks: task_blocks,
                    children: task_children,
                    is_ready,
                },
            );
        }
        Ok(result)
    }

    #[instrument(skip(self, input))]
    pub async fn update(&self, id: &str, input: UpdateTask) -> Result<Task> {
        let existing = self
            .tasks
            .get_by_id(id)
            .await?
            .ok_or_else(|| CoreError::not_found_id(id))?;

        if let Some(Some(parent_id)) = &input.parent_id {
            if parent_id == id {
                return Err(CoreError::CyclicParent(id.to_string()));
            }
            if self.tasks.get_by_id(parent_id).await?.is_none() {
                return Err(CoreError::not_found_id(parent_id));
            }
        }

        let crossing_to_done = matches!(input.status, Some(TaskStatus::Done)) && existing.status != TaskStatus::Done;
        let updated = self.tasks.update(id, input).await?;

        if crossing_to_done {
            self.auto_complete_ancestors(&updated).await?;
        }

        Ok(updated)
    }

    pub async fn force_status(&self, id: &str, status: TaskStatus) -> Result<Task> {
        self.tasks.force_status(id, status).await
    }

    /// Walks the ancestor chain of a just-completed task, marking each
    /// ancestor `done` iff every one of its direct children is `done`
    /// (accounting for ancestors completed earlier in this same pass).
    /// Stops at the first ancestor that cannot be completed, per spec
    /// §4.2: none above it can be either.
    async fn auto_complete_ancestors(&self, task: &Task) -> Result<()> {
        let mut completed_in_pass: HashSet<String> = HashSet::new();
        let mut current_parent = task.parent_id.clone();
        let mut depth = 0;

        while let Some(parent_id) = current_parent {
            depth += 1;
            if depth > MAX_RECURSION_DEPTH {
                warn!(task_id = %task.id, "ancestor auto-complete walk exceeded max depth");
                break;
            }

            let Some(parent) = self.tasks.get_by_id(&parent_id).await? else {
                break;
            };
            if parent.status == TaskStatus::Done {
                completed_in_pass.insert(parent.id.clone());
                current_parent = parent.parent_id;
                continue;
            }

            let siblings = self.tasks.list_children(&parent_id).await?;
            let all_done = siblings
                .iter()
                .all(|s| s.status == TaskStatus::Done || completed_in_pass.contains(&s.id));
            if !all_done {
                break;
            }

            self.tasks.force_status(&parent_id, TaskStatus::Done).await?;
            debug!(task_id = %parent_id, "auto-completed ancestor");
            completed_in_pass.insert(parent_id.clone());
            current_parent = parent.parent_id;
        }
        Ok(())
    }

    /// Removes `id`. With `cascade = false` and existing children, fails
    /// with [`CoreError::HasChildren`]. With `cascade = true`, collects
    /// every descendant (bounded by `MAX_RECURSION_DEPTH`), cleans up
    /// dependency edges mentioning any of them as defense-in-depth, then
    /// deletes deepest-first before the root.
    #[instrument(skip(self))]
    pub async fn remove(&self, id: &str, cascade: bool) -> Result<()> {
        self.tasks.get_by_id(id).await?.ok_or_else(|| CoreError::not_found_id(id))?;

        let children = self.tasks.list_children(id).await?;
        if children.is_empty() {
            self.dependencies.remove_all_mentioning(&[id.to_string()]).await?;
            self.tasks.delete(id).await?;
            return Ok(());
        }

        if !cascade {
            return Err(CoreError::HasChildren(id.to_string()));
        }

        let descendants = self.collect_descendants(id).await?;
        let mut all_ids: Vec<String> = descendants.clone();
        all_ids.push(id.to_string());

        self.dependencies.remove_all_mentioning(&all_ids).await?;

        for descendant_id in descendants.iter().rev() {
            self.tasks.delete(descendant_id).await?;
        }
        self.tasks.delete(id).await?;
        info!(task_id = %id, removed = all_ids.len(), "cascaded delete");
        Ok(())
    }

    async fn collect_descendants(&self, root_id: &str) -> Result<Vec<String>> {
        let mut ordered = Vec::new();
        let mut frontier = vec![root_id.to_string()];
        let mut depth = 0;

        while !frontier.is_empty() {
            depth += 1;
            if depth > MAX_RECURSION_DEPTH {
                warn!(task_id = %root_id, "descendant walk exceeded max depth");
                break;
            }
            let mut next_frontier = Vec::new();
            for parent_id in &frontier {
                let children = self.tasks.list_children(parent_id).await?;
                for child in children {
                    ordered.push(child.id.clone());
                    next_frontier.push(child.id);
                }
            }
            frontier = next_frontier;
        }
        Ok(ordered)
    }

    pub async fn list(&self, filter: TaskFilter) -> Result<Vec<Task>> {
        self.tasks.list(filter).await
    }

    pub async fn list_with_deps(&self, filter: TaskFilter) -> Result<Vec<TaskWithDeps>> {
        let tasks = self.tasks.list(filter).await?;
        let ids: Vec<String> = tasks.iter().map(|t| t.id.clone()).collect();
        let mut by_id = self.get_with_deps_batch(&ids).await?;
        Ok(ids.into_iter().filter_map(|id| by_id.remove(&id)).collect())
    }

    pub async fn count(&self, filter: TaskFilter) -> Result<u64> {
        self.tasks.count(filter).await
    }

    pub async fn stats(&self) -> Result<TaskStats> {
        self.tasks.stats().await
    }

    pub async fn add_dependency(&self, blocker_id: &str, blocked_id: &str) -> Result<TaskDependency> {
        if self.tasks.get_by_id(blocker_id).await?.is_none() {
            return Err(CoreError::not_found_id(blocker_id));
        }
        if self.tasks.get_by_id(blocked_id).await?.is_none() {
            return Err(CoreError::not_found_id(blocked_id));
        }
        self.dependencies.add(blocker_id, blocked_id).await
    }

    pub async fn remove_dependency(&self, blocker_id: &str, blocked_id: &str) -> Result<bool> {
        self.dependencies.remove(blocker_id, blocked_id).await
    }
}

/// Wraps a childless, dependency-free task (the `get_with_deps` fallback
/// when the batch query finds nothing to enrich, e.g. newly created tasks).
fn enrich(task: Task) -> TaskWithDeps {
    let is_ready = task.status.is_workable();
    TaskWithDeps {
        task,
        blocked_by: Vec::new(),
        blocks: Vec::new(),
        children: Vec::new(),
        is_ready,
    }
}

#[cfg(test)]
mod tests;
