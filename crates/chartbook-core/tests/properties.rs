use chartbook_core::{ChartNode, ContentBounds, analyze_tree, fit_to_target};
use proptest::prelude::*;

/// One root, `depth - 1` intermediate levels, and `breadth` leaves on the last level.
fn shaped_tree(depth: usize, breadth: usize) -> Vec<ChartNode> {
    let mut nodes = vec![ChartNode::new("l0", None)];
    for l in 1..depth.saturating_sub(1) {
        nodes.push(ChartNode::new(format!("l{l}"), Some(&format!("l{}", l - 1))));
    }
    if depth > 1 {
        let parent = format!("l{}", depth - 2);
        for i in 0..breadth {
            nodes.push(ChartNode::new(format!("leaf{i}"), Some(&parent)));
        }
    }
    nodes
}

proptest! {
    #[test]
    fn breadth_tiers_fix_node_width(depth in 2usize..8, breadth in 1usize..40) {
        let a = analyze_tree(&shaped_tree(depth, breadth));
        prop_assert_eq!(a.max_breadth, breadth);
        if breadth > 10 {
            prop_assert_eq!(a.layout_params.node_width, 200.0);
        } else if breadth > 7 {
            prop_assert_eq!(a.layout_params.node_width, 220.0);
        }
    }

    #[test]
    fn node_width_never_grows_with_breadth(depth in 2usize..8, breadth in 1usize..40, extra in 1usize..20) {
        let narrow = analyze_tree(&shaped_tree(depth, breadth));
        let wide = analyze_tree(&shaped_tree(depth, breadth + extra));
        prop_assert!(wide.layout_params.node_width <= narrow.layout_params.node_width);
    }

    #[test]
    fn fitted_content_is_never_cropped(
        w in 1.0f64..20_000.0,
        h in 1.0f64..20_000.0,
        tw in 10.0f64..5000.0,
        th in 10.0f64..5000.0,
        fill in 0.5f64..1.5,
    ) {
        let bounds = ContentBounds {
            x: 0.0,
            y: 0.0,
            width: w,
            height: h,
            original_width: w,
            original_height: h,
            margin: 0.0,
        };
        let s = fit_to_target(&bounds, tw, th, fill);
        prop_assert!(s.final_width <= tw);
        prop_assert!(s.final_height <= th);
        prop_assert!(s.offset_x >= 0.0);
        prop_assert!(s.offset_y >= 0.0);
    }
}
