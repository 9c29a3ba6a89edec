use std::collections::HashSet;

use lunyu_types::{Entity, MatchedEntity};

/// Alias table for mention detection, in entity table order.
#[derive(Clone, Debug, Default)]
pub struct Identifier {
    entries: Vec<(String, Vec<String>)>,
}

impl Identifier {
    pub fn new(entities: &[Entity]) -> Self {
        let entries = entities
            .iter()
            .map(|entity| {
                let aliases = entity
                    .search_aliases
                    .iter()
                    .filter(|alias| !alias.is_empty())
                    .cloned()
                    .collect();
                (entity.canonical_name.clone(), aliases)
            })
            .collect();
        Self { entries }
    }

    /// Entities mentioned in `text`, one per canonical name.
    ///
    /// Order follows the entity table, not the text. For each entity the
    /// reported alias is the first one in its alias list that occurs in `text`.
    pub fn identify(&self, text: &str) -> Vec<MatchedEntity> {
        self.identify_excluding(text, &[])
    }

    /// Like [`identify`](Self::identify), dropping the listed canonical names.
    pub fn identify_excluding(&self, text: &str, excluded: &[&str]) -> Vec<MatchedEntity> {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut found = Vec::new();
        for (name, aliases) in &self.entries {
            if excluded.contains(&name.as_str()) || seen.contains(name.as_str()) {
                continue;
            }
            if let Some(alias) = aliases.iter().find(|alias| text.contains(alias.as_str())) {
                seen.insert(name.as_str());
                found.push(MatchedEntity::new(name.clone(), alias.clone()));
            }
        }
        found
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity(name: &str, aliases: &[&str]) -> Entity {
        Entity {
            canonical_name: name.to_string(),
            search_aliases: aliases.iter().map(|a| a.to_string()).collect(),
            ..Entity::default()
        }
    }

    #[test]
    fn first_listed_alias_wins() {
        let ids = Identifier::new(&[entity("孔子", &["孔子", "子"])]);
        assert_eq!(
            ids.identify("孔子曰：子曰"),
            vec![MatchedEntity::new("孔子", "孔子")]
        );
    }

    #[test]
    fn alias_order_not_text_order_decides_report() {
        let ids = Identifier::new(&[entity("子路", &["子路", "由"])]);
        assert_eq!(
            ids.identify("由也，子路"),
            vec![MatchedEntity::new("子路", "子路")]
        );
    }

    #[test]
    fn results_follow_table_order() {
        let ids = Identifier::new(&[entity("顏淵", &["顏淵", "回"]), entity("子貢", &["子貢", "賜"])]);
        let found = ids.identify("賜也聞一以知二，回也聞一以知十");
        let names: Vec<_> = found.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["顏淵", "子貢"]);
    }

    #[test]
    fn duplicate_canonical_names_collapse() {
        let ids = Identifier::new(&[entity("孔子", &["仲尼"]), entity("孔子", &["孔子"])]);
        assert_eq!(ids.identify("仲尼、孔子").len(), 1);
    }

    #[test]
    fn empty_aliases_never_match() {
        let ids = Identifier::new(&[entity("無名", &[""])]);
        assert!(ids.identify("anything").is_empty());
    }

    #[test]
    fn exclusion_drops_names() {
        let ids = Identifier::new(&[entity("孔子", &["孔子"]), entity("顏淵", &["顏淵"])]);
        let found = ids.identify_excluding("孔子謂顏淵", &["孔子"]);
        assert_eq!(found, vec![MatchedEntity::new("顏淵", "顏淵")]);
    }
}
