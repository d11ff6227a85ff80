//! Block lowering order shared by the backends
//!
//! Blocks are lowered in reverse postorder from the entry block, so every
//! value is materialized before the blocks it dominates use it. Blocks the
//! entry cannot reach follow in index order.

use pcb_ir::{BlockId, EntityId, Function};

pub fn lowering_order(function: &Function) -> Vec<BlockId> {
    let blocks = function.blocks();
    let mut visited = vec![false; blocks.len()];
    let mut postorder = Vec::with_capacity(blocks.len());

    if let Some(entry) = function.entry() {
        // Iterative DFS; each frame is a block and the index of its next successor
        let mut stack: Vec<(BlockId, usize)> = vec![(entry, 0)];
        visited[entry.index()] = true;

        while let Some((block, next)) = stack.pop() {
            let successors = blocks[block]
                .terminator()
                .map(|t| t.successors())
                .unwrap_or_default();

            match successors.get(next) {
                Some(&succ) => {
                    stack.push((block, next + 1));
                    if succ.index() < visited.len() && !visited[succ.index()] {
                        visited[succ.index()] = true;
                        stack.push((succ, 0));
                    }
                }
                None => postorder.push(block),
            }
        }
    }

    postorder.reverse();
    postorder.extend(blocks.ids().filter(|id| !visited[id.index()]));
    postorder
}

#[cfg(test)]
mod tests {
    use super::*;
    use pcb_ir::{Context, FunctionSignature};

    #[test]
    fn test_forward_definition_ordering() {
        // bb0 -> bb2 -> bb1, bb3 unreachable
        let mut ctx = Context::new(false);
        let int32 = ctx.int_type(32).unwrap();
        let func = ctx
            .add_function("f", FunctionSignature::new(vec![], int32))
            .unwrap();
        let bb0 = ctx.append_block(func).unwrap();
        let bb1 = ctx.append_block(func).unwrap();
        let bb2 = ctx.append_block(func).unwrap();
        let bb3 = ctx.append_block(func).unwrap();

        ctx.set_terminator_branch(bb0, bb2).unwrap();
        ctx.set_terminator_branch(bb2, bb1).unwrap();
        let zero = ctx.build_const(bb1, int32, 0).unwrap();
        ctx.set_terminator_return(bb1, zero).unwrap();
        ctx.set_terminator_branch(bb3, bb0).unwrap();

        let order = lowering_order(ctx.function(func).unwrap());
        assert_eq!(order, vec![bb0.id(), bb2.id(), bb1.id(), bb3.id()]);
    }

    #[test]
    fn test_diamond_and_loop() {
        let mut ctx = Context::new(false);
        let int1 = ctx.int_type(1).unwrap();
        let int32 = ctx.int_type(32).unwrap();
        let func = ctx
            .add_function("f", FunctionSignature::new(vec![int1], int32))
            .unwrap();
        let entry = ctx.append_block(func).unwrap();
        let left = ctx.append_block(func).unwrap();
        let right = ctx.append_block(func).unwrap();
        let join = ctx.append_block(func).unwrap();

        let cond = ctx.get_argument(func, 0).unwrap();
        ctx.set_terminator_cond_branch(entry, cond, left, right).unwrap();
        ctx.set_terminator_branch(left, join).unwrap();
        ctx.set_terminator_branch(right, join).unwrap();
        ctx.set_terminator_branch(join, entry).unwrap();

        let order = lowering_order(ctx.function(func).unwrap());
        assert_eq!(order.len(), 4);
        assert_eq!(order[0], entry.id());
        assert_eq!(order[3], join.id());
    }
}
