//! `storyloom categories`: list trim categories in precedence order.

use storyloom_core::Category;

fn typical_content(category: Category) -> &'static str {
    match category {
        Category::Input => "player input, unrecognised keys",
        Category::State => "player and game state",
        Category::Npcs => "NPC biographies",
        Category::Scenario => "scenario data",
        Category::World => "world lore and tone",
        Category::Module => "adventure module content",
        Category::Ruleset => "ruleset principles",
        Category::Core => "core rules",
    }
}

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    println!("🗂  Trim categories (trimmed first → last)");
    println!("─────────────────────────────────────");
    for category in Category::ALL {
        println!(
            "  {}  {:<10} {}",
            category.precedence_rank(),
            category.as_str(),
            typical_content(category)
        );
    }
    println!();
    println!("  Keys are classified by their prefix before the first '.'");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_category_is_described() {
        for category in Category::ALL {
            assert!(!typical_content(category).is_empty());
        }
    }
}
