// Recursive helpers over the task tree
//
// Traversal is pre-order (parent before children). Nothing here inserts or
// removes nodes while walking; `remove_by_id` is a separate, non-traversing edit.

use super::filter::Filter;
use super::model::{Task, TaskId};

/// Visit every task in the subtree rooted at `task`, read-only
pub fn for_each<'a, F>(task: &'a Task, mut f: F)
where
    F: FnMut(&'a Task),
{
    fn walk<'a, F: FnMut(&'a Task)>(task: &'a Task, f: &mut F) {
        f(task);
        for child in &task.subtasks {
            walk(child, f);
        }
    }
    walk(task, &mut f);
}

/// Visit every task with a mutable reference, parent before children
///
/// The callback may reorder or edit a node's `subtasks` before they are
/// visited (e.g. sorting each level); children are then walked by index.
pub fn for_each_mut<F>(task: &mut Task, mut f: F)
where
    F: FnMut(&mut Task),
{
    fn walk<F: FnMut(&mut Task)>(task: &mut Task, f: &mut F) {
        f(task);
        for index in 0..task.subtasks.len() {
            walk(&mut task.subtasks[index], f);
        }
    }
    walk(task, &mut f);
}

/// Siblings matching every filter, in their original order
///
/// Only the task's own fields are tested; an empty filter list matches all.
pub fn find_many<'a>(tasks: &'a [Task], filters: &[Filter]) -> Vec<&'a Task> {
    tasks
        .iter()
        .filter(|task| filters.iter().all(|filter| filter.matches(task)))
        .collect()
}

/// Copy of `root` reduced to what a filtered display should show
///
/// A matching task keeps its whole subtree. A non-matching task survives
/// only when a descendant matches, and its children are pruned the same way.
/// The root itself is never tested.
pub fn prune(root: &Task, filters: &[Filter]) -> Task {
    fn prune_children(children: &[Task], filters: &[Filter]) -> Vec<Task> {
        children
            .iter()
            .filter_map(|child| prune_node(child, filters))
            .collect()
    }

    fn prune_node(task: &Task, filters: &[Filter]) -> Option<Task> {
        if !find_many(std::slice::from_ref(task), filters).is_empty() {
            return Some(task.clone());
        }
        let subtasks = prune_children(&task.subtasks, filters);
        if subtasks.is_empty() {
            return None;
        }
        Some(Task {
            subtasks,
            ..task.clone()
        })
    }

    if filters.is_empty() {
        return root.clone();
    }

    Task {
        subtasks: prune_children(&root.subtasks, filters),
        ..root.clone()
    }
}

/// Every task in pre-order, skipping the synthetic root
pub fn flatten(task: &Task) -> Vec<&Task> {
    let mut out = Vec::new();
    for_each(task, |t| {
        if !t.is_root() {
            out.push(t);
        }
    });
    out
}

pub fn find_by_id(task: &Task, id: TaskId) -> Option<&Task> {
    if task.id == id {
        return Some(task);
    }
    task.subtasks.iter().find_map(|child| find_by_id(child, id))
}

pub fn find_by_id_mut(task: &mut Task, id: TaskId) -> Option<&mut Task> {
    if task.id == id {
        return Some(task);
    }
    task.subtasks
        .iter_mut()
        .find_map(|child| find_by_id_mut(child, id))
}

/// Detach the task with `id` (and its subtree) from anywhere below `task`
pub fn remove_by_id(task: &mut Task, id: TaskId) -> Option<Task> {
    if let Some(index) = task.subtasks.iter().position(|child| child.id == id) {
        return Some(task.subtasks.remove(index));
    }
    task.subtasks
        .iter_mut()
        .find_map(|child| remove_by_id(child, id))
}

/// Largest id anywhere in the tree
pub fn max_id(task: &Task) -> TaskId {
    let mut max = task.id;
    for_each(task, |t| max = max.max(t.id));
    max
}
