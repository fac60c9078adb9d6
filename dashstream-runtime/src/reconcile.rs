//! Widget population reconciler: diffs the declared widget/layout collection
//! against the materialized instances and applies add/update/remove records
//! incrementally. Unaffected instances are never destroyed and recreated;
//! an id removed and re-added in one pass is an update, and layout-only
//! changes patch the surviving instance in place.

use dashstream_model::{Widget, WidgetLayout};
use std::collections::{HashMap, HashSet};
use tracing::warn;
use uuid::Uuid;

/// Materialized widget instance: declared value + layout + runtime flags.
#[derive(Debug, Clone, PartialEq)]
pub struct DashboardWidget {
    pub widget: Widget,
    pub layout: WidgetLayout,
    pub highlighted: bool,
    pub selected: bool,
    instance_id: u64,
}

impl DashboardWidget {
    /// Stable identity of the materialized instance; survives updates,
    /// changes only on destroy+recreate.
    pub fn instance_id(&self) -> u64 {
        self.instance_id
    }
}

/// Record stream consumed by the rendering layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WidgetChange {
    Added { id: Uuid },
    Updated { id: Uuid },
    Removed { id: Uuid },
}

impl WidgetChange {
    pub fn id(&self) -> Uuid {
        match self {
            WidgetChange::Added { id }
            | WidgetChange::Updated { id }
            | WidgetChange::Removed { id } => *id,
        }
    }
}

/// Incrementally maintained widget population of one dashboard layout.
#[derive(Default)]
pub struct DashboardWidgets {
    widgets: Vec<DashboardWidget>,
    mobile: bool,
    max_rows: u32,
    next_instance: u64,
}

impl DashboardWidgets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Instances in display order.
    pub fn widgets(&self) -> &[DashboardWidget] {
        &self.widgets
    }

    pub fn widget(&self, id: Uuid) -> Option<&DashboardWidget> {
        self.widgets.iter().find(|w| w.widget.id == id)
    }

    pub fn len(&self) -> usize {
        self.widgets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.widgets.is_empty()
    }

    /// Maximum occupied row bound, for layout sizing.
    pub fn max_rows(&self) -> u32 {
        self.max_rows
    }

    pub fn is_mobile(&self) -> bool {
        self.mobile
    }

    /// Switch mobile ordering; re-sorts without touching instances.
    pub fn set_mobile(&mut self, mobile: bool) {
        if self.mobile != mobile {
            self.mobile = mobile;
            self.sort_widgets();
        }
    }

    pub fn set_highlighted(&mut self, id: Uuid, highlighted: bool) {
        if let Some(widget) = self.widgets.iter_mut().find(|w| w.widget.id == id) {
            widget.highlighted = highlighted;
        }
    }

    pub fn set_selected(&mut self, id: Uuid, selected: bool) {
        if let Some(widget) = self.widgets.iter_mut().find(|w| w.widget.id == id) {
            widget.selected = selected;
        }
    }

    /// One reconciliation pass against the declared collection. Returns the
    /// applied records; an unchanged input returns none.
    pub fn reconcile(
        &mut self,
        declared: &[Widget],
        layouts: &HashMap<Uuid, WidgetLayout>,
    ) -> Vec<WidgetChange> {
        let mut changes = Vec::new();

        // last write wins on duplicate declared ids
        let mut declared_by_id: HashMap<Uuid, &Widget> = HashMap::new();
        let mut declared_order: Vec<Uuid> = Vec::new();
        for widget in declared {
            if declared_by_id.insert(widget.id, widget).is_some() {
                warn!(widget_id = %widget.id, "duplicate widget id in declared collection");
            } else {
                declared_order.push(widget.id);
            }
        }
        for id in layouts.keys() {
            if !declared_by_id.contains_key(id) {
                warn!(widget_id = %id, "layout entry for undeclared widget ignored");
            }
        }

        let existing_ids: HashSet<Uuid> = self.widgets.iter().map(|w| w.widget.id).collect();

        // removals
        let mut removed = Vec::new();
        self.widgets.retain(|instance| {
            if declared_by_id.contains_key(&instance.widget.id) {
                true
            } else {
                removed.push(instance.widget.id);
                false
            }
        });
        changes.extend(removed.into_iter().map(|id| WidgetChange::Removed { id }));

        // additions and survivor updates, in declared order
        for id in declared_order {
            let widget = declared_by_id[&id];
            let layout = layouts.get(&id).copied().unwrap_or_default();
            if existing_ids.contains(&id) {
                let instance = self
                    .widgets
                    .iter_mut()
                    .find(|w| w.widget.id == id)
                    .expect("survivor is present");
                let content_changed = instance.widget != *widget;
                let layout_changed = instance.layout != layout;
                if content_changed {
                    // update in place, never destroy+recreate; flags only
                    // survive structurally equal content
                    instance.widget = widget.clone();
                    instance.highlighted = false;
                    instance.selected = false;
                }
                if layout_changed {
                    instance.layout = layout;
                }
                if content_changed || layout_changed {
                    changes.push(WidgetChange::Updated { id });
                }
            } else {
                self.widgets.push(DashboardWidget {
                    widget: widget.clone(),
                    layout,
                    highlighted: false,
                    selected: false,
                    instance_id: self.next_instance,
                });
                self.next_instance += 1;
                changes.push(WidgetChange::Added { id });
            }
        }

        if !changes.is_empty() {
            self.sort_widgets();
        }
        self.recompute_max_rows();
        changes
    }

    fn sort_widgets(&mut self) {
        let mobile = self.mobile;
        self.widgets.sort_by_key(|w| Self::sort_key(w, mobile));
    }

    /// Explicit order key first, position (row-major) as fallback.
    fn sort_key(widget: &DashboardWidget, mobile: bool) -> (i64, u32, u32) {
        let explicit = if mobile {
            widget.layout.mobile_order.or(widget.layout.order)
        } else {
            widget.layout.order
        };
        let order = explicit.map(i64::from).unwrap_or(i64::MAX);
        (order, widget.layout.row, widget.layout.col)
    }

    fn recompute_max_rows(&mut self) {
        self.max_rows = self
            .widgets
            .iter()
            .map(|w| w.layout.row + w.layout.size_y)
            .max()
            .unwrap_or(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dashstream_model::{WidgetConfig, WidgetKind};

    fn widget(id: Uuid, title: &str) -> Widget {
        Widget {
            id,
            type_fqn: "charts.test".to_string(),
            kind: WidgetKind::Latest,
            config: WidgetConfig {
                title: title.to_string(),
                ..Default::default()
            },
        }
    }

    fn layout(row: u32, col: u32) -> WidgetLayout {
        WidgetLayout::new(row, col, 4, 3)
    }

    #[test]
    fn first_pass_adds_everything() {
        let mut population = DashboardWidgets::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let declared = vec![widget(a, "A"), widget(b, "B")];
        let layouts = HashMap::from([(a, layout(0, 0)), (b, layout(3, 0))]);

        let changes = population.reconcile(&declared, &layouts);
        assert_eq!(changes.len(), 2);
        assert!(changes.iter().all(|c| matches!(c, WidgetChange::Added { .. })));
        assert_eq!(population.len(), 2);
        assert_eq!(population.max_rows(), 6);
    }

    #[test]
    fn unchanged_input_is_idempotent() {
        let mut population = DashboardWidgets::new();
        let a = Uuid::new_v4();
        let declared = vec![widget(a, "A")];
        let layouts = HashMap::from([(a, layout(0, 0))]);

        population.reconcile(&declared, &layouts);
        let instance_id = population.widget(a).unwrap().instance_id();

        let changes = population.reconcile(&declared, &layouts);
        assert!(changes.is_empty());
        assert_eq!(population.widget(a).unwrap().instance_id(), instance_id);
    }

    #[test]
    fn removal_emits_removed_record() {
        let mut population = DashboardWidgets::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        population.reconcile(
            &[widget(a, "A"), widget(b, "B")],
            &HashMap::from([(a, layout(0, 0)), (b, layout(1, 0))]),
        );

        let changes = population.reconcile(&[widget(a, "A")], &HashMap::from([(a, layout(0, 0))]));
        assert_eq!(changes, vec![WidgetChange::Removed { id: b }]);
        assert!(population.widget(b).is_none());
    }

    #[test]
    fn same_id_readd_with_changed_content_is_update_with_flag_reset() {
        let mut population = DashboardWidgets::new();
        let a = Uuid::new_v4();
        let layouts = HashMap::from([(a, layout(0, 0))]);
        population.reconcile(&[widget(a, "A")], &layouts);
        population.set_highlighted(a, true);
        let instance_id = population.widget(a).unwrap().instance_id();

        // same id, different content: update, not destroy+recreate
        let changes = population.reconcile(&[widget(a, "A v2")], &layouts);
        assert_eq!(changes, vec![WidgetChange::Updated { id: a }]);
        let instance = population.widget(a).unwrap();
        assert_eq!(instance.instance_id(), instance_id);
        assert_eq!(instance.widget.config.title, "A v2");
        // content changed: flags reset
        assert!(!instance.highlighted);
    }

    #[test]
    fn layout_only_change_patches_in_place_and_keeps_flags() {
        let mut population = DashboardWidgets::new();
        let a = Uuid::new_v4();
        population.reconcile(&[widget(a, "A")], &HashMap::from([(a, layout(0, 0))]));
        population.set_highlighted(a, true);
        population.set_selected(a, true);
        let instance_id = population.widget(a).unwrap().instance_id();

        let changes =
            population.reconcile(&[widget(a, "A")], &HashMap::from([(a, layout(5, 2))]));
        assert_eq!(changes, vec![WidgetChange::Updated { id: a }]);

        let instance = population.widget(a).unwrap();
        assert_eq!(instance.instance_id(), instance_id);
        assert_eq!(instance.layout.row, 5);
        assert!(instance.highlighted);
        assert!(instance.selected);
        assert_eq!(population.max_rows(), 8);
    }

    #[test]
    fn duplicate_ids_are_tolerated_last_write_wins() {
        let mut population = DashboardWidgets::new();
        let a = Uuid::new_v4();
        let declared = vec![widget(a, "first"), widget(a, "second")];
        let changes = population.reconcile(&declared, &HashMap::from([(a, layout(0, 0))]));

        assert_eq!(population.len(), 1);
        assert_eq!(changes.len(), 1);
        assert_eq!(population.widget(a).unwrap().widget.config.title, "second");
    }

    #[test]
    fn orphaned_layout_entries_are_ignored() {
        let mut population = DashboardWidgets::new();
        let a = Uuid::new_v4();
        let orphan = Uuid::new_v4();
        let layouts = HashMap::from([(a, layout(0, 0)), (orphan, layout(9, 9))]);

        population.reconcile(&[widget(a, "A")], &layouts);
        assert_eq!(population.len(), 1);
        assert_eq!(population.max_rows(), 3);
    }

    #[test]
    fn sorted_by_position_with_explicit_order_override() {
        let mut population = DashboardWidgets::new();
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let mut layout_c = layout(9, 0);
        layout_c.order = Some(-1);
        let layouts = HashMap::from([(a, layout(4, 0)), (b, layout(0, 2)), (c, layout_c)]);

        population.reconcile(&[widget(a, "A"), widget(b, "B"), widget(c, "C")], &layouts);
        let ids: Vec<Uuid> = population.widgets().iter().map(|w| w.widget.id).collect();
        // explicit order wins, then row-major position
        assert_eq!(ids, vec![c, b, a]);
    }

    #[test]
    fn mobile_ordering_uses_mobile_order() {
        let mut population = DashboardWidgets::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let mut layout_a = layout(0, 0);
        layout_a.mobile_order = Some(10);
        let mut layout_b = layout(5, 0);
        layout_b.mobile_order = Some(1);
        let layouts = HashMap::from([(a, layout_a), (b, layout_b)]);

        population.reconcile(&[widget(a, "A"), widget(b, "B")], &layouts);
        let desktop: Vec<Uuid> = population.widgets().iter().map(|w| w.widget.id).collect();
        assert_eq!(desktop, vec![a, b]);

        population.set_mobile(true);
        let mobile: Vec<Uuid> = population.widgets().iter().map(|w| w.widget.id).collect();
        assert_eq!(mobile, vec![b, a]);
    }

    #[test]
    fn never_two_instances_for_one_id() {
        let mut population = DashboardWidgets::new();
        let a = Uuid::new_v4();
        let layouts = HashMap::from([(a, layout(0, 0))]);
        population.reconcile(&[widget(a, "A")], &layouts);
        population.reconcile(&[widget(a, "A"), widget(a, "A dup")], &layouts);

        let count = population
            .widgets()
            .iter()
            .filter(|w| w.widget.id == a)
            .count();
        assert_eq!(count, 1);
    }

    #[test]
    fn add_and_remove_in_one_pass() {
        let mut population = DashboardWidgets::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        population.reconcile(&[widget(a, "A")], &HashMap::from([(a, layout(0, 0))]));

        let changes = population.reconcile(&[widget(b, "B")], &HashMap::from([(b, layout(0, 0))]));
        assert_eq!(changes.len(), 2);
        assert!(changes.contains(&WidgetChange::Removed { id: a }));
        assert!(changes.contains(&WidgetChange::Added { id: b }));
    }
}
